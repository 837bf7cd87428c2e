//! Sync direction and failure policy
//!
//! Each enum includes:
//! - FromStr implementation for CLI and config parsing
//! - Display using the same kebab-case names as serde

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// DIRECTION
// ============================================================================

/// Which side of the reconciliation is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
	/// Server snapshot flows into the local tree and directories
	#[default]
	Pull,

	/// Local tree is uploaded to the server
	Push,
}

impl Direction {
	/// Solved tasks are protected only when content flows towards the learner
	pub fn protects_solved(self) -> bool {
		matches!(self, Self::Pull)
	}
}

impl FromStr for Direction {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"pull" | "update" => Ok(Self::Pull),
			"push" | "upload" => Ok(Self::Push),
			_ => Err(format!("Unknown direction: {}. Valid options: pull, push", s)),
		}
	}
}

impl std::fmt::Display for Direction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Pull => write!(f, "pull"),
			Self::Push => write!(f, "push"),
		}
	}
}

// ============================================================================
// ERROR POLICY
// ============================================================================

/// What the executor does after an action fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
	/// Abandon the remaining plan
	#[default]
	Abort,

	/// Skip actions on the failed item and its descendants, continue with siblings
	SkipDependents,
}

impl FromStr for ErrorPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"abort" | "stop" => Ok(Self::Abort),
			"skip-dependents" | "skip" | "continue" => Ok(Self::SkipDependents),
			_ => Err(format!("Unknown error policy: {}. Valid options: abort, skip-dependents", s)),
		}
	}
}

impl std::fmt::Display for ErrorPolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Abort => write!(f, "abort"),
			Self::SkipDependents => write!(f, "skip-dependents"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_direction_from_str() {
		assert_eq!("pull".parse::<Direction>().unwrap(), Direction::Pull);
		assert_eq!("UPLOAD".parse::<Direction>().unwrap(), Direction::Push);
		assert!("sideways".parse::<Direction>().is_err());
	}

	#[test]
	fn test_error_policy_round_trips_through_display() {
		for policy in [ErrorPolicy::Abort, ErrorPolicy::SkipDependents] {
			assert_eq!(policy.to_string().parse::<ErrorPolicy>().unwrap(), policy);
		}
	}

	#[test]
	fn test_defaults() {
		assert_eq!(Direction::default(), Direction::Pull);
		assert_eq!(ErrorPolicy::default(), ErrorPolicy::Abort);
		assert!(Direction::Pull.protects_solved());
		assert!(!Direction::Push.protects_solved());
	}

	#[test]
	fn test_serde_names() {
		let json = serde_json::to_string(&ErrorPolicy::SkipDependents).unwrap();
		assert_eq!(json, "\"skip-dependents\"");
	}
}

// vim: ts=4
