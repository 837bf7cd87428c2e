//! Configuration for course synchronization
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (SyncConfig::default())
//! 2. Config file (`.toml`, or `.json`/`.json5`)
//! 3. Environment variables (COURSESYNC_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use crate::error::SyncError;
use crate::executor::DEFAULT_ASIDE_PREFIX;
use crate::strategies::ErrorPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of a reconciliation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
	/// Directory holding the local course layout
	pub course_root: PathBuf,

	/// Where baselines and lock files live (~/.coursesync)
	pub state_dir: PathBuf,

	/// Profile name for state isolation
	pub profile: String,

	/// Keep files of solved tasks on pull
	pub protect_solved: bool,

	/// Prefix for directories moved out of the way of a rename or creation
	pub aside_prefix: String,

	/// What to do after a failed action
	pub error_policy: ErrorPolicy,

	/// Send a notification when a run finishes or fails
	pub notify: bool,

	/// Default tracing filter when RUST_LOG is unset
	pub log_level: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		SyncConfig {
			course_root: PathBuf::from("."),
			state_dir: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".coursesync"))
				.unwrap_or_else(|| PathBuf::from(".coursesync")),
			profile: "default".to_string(),
			protect_solved: true,
			aside_prefix: DEFAULT_ASIDE_PREFIX.to_string(),
			error_policy: ErrorPolicy::Abort,
			notify: true,
			log_level: "info".to_string(),
		}
	}
}

fn parse_bool(name: &str, value: &str) -> Result<bool, SyncError> {
	match value.to_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(SyncError::InvalidConfig {
			message: format!("{} must be a boolean, got '{}'", name, value),
		}),
	}
}

impl SyncConfig {
	/// Parse a config file, picking the format from its extension
	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let text = std::fs::read_to_string(path).map_err(|e| SyncError::InvalidConfig {
			message: format!("Cannot read {}: {}", path.display(), e),
		})?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
		match ext.as_str() {
			"toml" => toml::from_str(&text).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			}),
			"json" | "json5" => json5::from_str(&text).map_err(|e| SyncError::InvalidConfig {
				message: format!("{}: {}", path.display(), e),
			}),
			_ => Err(SyncError::InvalidConfig {
				message: format!(
					"Unsupported config format '{}'. Valid options: toml, json, json5",
					path.display()
				),
			}),
		}
	}

	/// Apply COURSESYNC_* environment variables
	pub fn apply_env(&mut self) -> Result<(), SyncError> {
		self.apply_vars(|name| std::env::var(name).ok())
	}

	/// Apply variables from an arbitrary lookup
	pub fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), SyncError> {
		if let Some(root) = get("COURSESYNC_COURSE_ROOT") {
			self.course_root = PathBuf::from(root);
		}
		if let Some(dir) = get("COURSESYNC_STATE_DIR") {
			self.state_dir = PathBuf::from(dir);
		}
		if let Some(profile) = get("COURSESYNC_PROFILE") {
			self.profile = profile;
		}
		if let Some(value) = get("COURSESYNC_PROTECT_SOLVED") {
			self.protect_solved = parse_bool("COURSESYNC_PROTECT_SOLVED", &value)?;
		}
		if let Some(value) = get("COURSESYNC_ERROR_POLICY") {
			self.error_policy =
				value.parse().map_err(|message| SyncError::InvalidConfig { message })?;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		if self.aside_prefix.is_empty() {
			return Err(SyncError::InvalidConfig {
				message: "asidePrefix must not be empty".to_string(),
			});
		}
		if self.aside_prefix.contains('/') || self.aside_prefix.contains('\\') {
			return Err(SyncError::InvalidConfig {
				message: format!(
					"asidePrefix '{}' must not contain path separators",
					self.aside_prefix
				),
			});
		}
		if self.profile.trim().is_empty() {
			return Err(SyncError::InvalidConfig {
				message: "profile must not be empty".to_string(),
			});
		}
		Ok(())
	}

	/// Defaults, then the optional file, then the environment
	pub fn load(path: Option<&Path>) -> Result<Self, SyncError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		config.apply_env()?;
		config.validate()?;
		Ok(config)
	}
}


// vim: ts=4
