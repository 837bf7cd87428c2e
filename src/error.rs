//! Error types for course synchronization

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for reconciliation
#[derive(Debug)]
pub enum SyncError {
	/// The remote snapshot could not be obtained
	FetchFailed { course_id: u64, message: String },

	/// A persisted config file could not be understood
	InvalidFormat(FormatError),

	/// A directory already occupied the target name and was moved aside
	DirectoryConflict { path: String, moved_to: String },

	/// An action failed after `applied` of `total` actions succeeded
	PartialApply { applied: usize, total: usize, source: Box<SyncError> },

	/// I/O error
	Io(io::Error),

	/// Remote service error (nested)
	Remote(RemoteError),

	/// A path escaping the course root or a name containing separators
	InvalidPath { path: String, reason: String },

	/// Another reconciliation holds the course lock
	LockFailed { message: String },

	/// State error (nested)
	State(StateError),

	/// Stopped between phases or actions
	Cancelled,

	/// Invalid configuration
	InvalidConfig { message: String },

	/// An item referenced by an action does not exist
	NotFound { what: String },

	/// A subtree was offered to a container that cannot hold it
	InvalidStructure { message: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::FetchFailed { course_id, message } => {
				write!(f, "Failed to fetch course {}: {}", course_id, message)
			}
			SyncError::InvalidFormat(e) => write!(f, "{}", e),
			SyncError::DirectoryConflict { path, moved_to } => {
				write!(f, "Directory {} already existed and was moved to {}", path, moved_to)
			}
			SyncError::PartialApply { applied, total, source } => {
				write!(f, "Sync incomplete: {} of {} actions applied: {}", applied, total, source)
			}
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Remote(e) => write!(f, "Remote error: {}", e),
			SyncError::InvalidPath { path, reason } => {
				write!(f, "Invalid path '{}': {}", path, reason)
			}
			SyncError::LockFailed { message } => {
				write!(f, "Lock acquisition failed: {}", message)
			}
			SyncError::State(e) => write!(f, "State error: {}", e),
			SyncError::Cancelled => write!(f, "Operation cancelled"),
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::NotFound { what } => write!(f, "Not found: {}", what),
			SyncError::InvalidStructure { message } => {
				write!(f, "Invalid course structure: {}", message)
			}
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io(e) => Some(e),
			SyncError::Remote(e) => Some(e),
			SyncError::State(e) => Some(e),
			SyncError::InvalidFormat(e) => Some(e),
			SyncError::PartialApply { source, .. } => Some(source.as_ref()),
			_ => None,
		}
	}
}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<RemoteError> for SyncError {
	fn from(e: RemoteError) -> Self {
		SyncError::Remote(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		match e {
			StateError::LockFailed { message } => SyncError::LockFailed { message },
			other => SyncError::State(other),
		}
	}
}

impl From<FormatError> for SyncError {
	fn from(e: FormatError) -> Self {
		SyncError::InvalidFormat(e)
	}
}

/// A config file that failed to deserialize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
	/// Offending file, when known
	pub file: Option<String>,

	/// User-actionable description, capitalized
	pub cause: String,
}

impl FormatError {
	pub fn new(cause: impl Into<String>) -> Self {
		FormatError { file: None, cause: capitalize(&cause.into()) }
	}

	pub fn in_file(mut self, file: &str) -> Self {
		self.file = Some(file.to_string());
		self
	}
}

impl fmt::Display for FormatError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.file {
			Some(file) => write!(f, "Invalid format in {}: {}", file, self.cause),
			None => write!(f, "Invalid format: {}", self.cause),
		}
	}
}

impl Error for FormatError {}

fn capitalize(text: &str) -> String {
	let mut chars = text.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

/// Errors reported by a course-hosting service adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
	/// Course or item id unknown to the service
	NotFound { what: String },

	/// Network or service unavailable
	Unreachable { message: String },

	/// The service refused the request
	Rejected { message: String },
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RemoteError::NotFound { what } => write!(f, "{} not found", what),
			RemoteError::Unreachable { message } => write!(f, "Service unreachable: {}", message),
			RemoteError::Rejected { message } => write!(f, "Request rejected: {}", message),
		}
	}
}

impl Error for RemoteError {}

/// State management errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load state
	LoadFailed { source: Box<dyn Error + Send + Sync> },

	/// Failed to save state
	SaveFailed { source: Box<dyn Error + Send + Sync> },

	/// Lock acquisition failed
	LockFailed { message: String },

	/// State file is corrupted
	Corrupted { message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { source } => write!(f, "Failed to load state: {}", source),
			StateError::SaveFailed { source } => write!(f, "Failed to save state: {}", source),
			StateError::LockFailed { message } => write!(f, "Lock failed: {}", message),
			StateError::Corrupted { message } => write!(f, "State corrupted: {}", message),
		}
	}
}

impl Error for StateError {}


// vim: ts=4
