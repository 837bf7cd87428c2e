//! Baseline persistence and the per-course reconciliation lock

use crate::error::StateError;
use crate::model::Course;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Persistent state manager for one sync profile
pub struct StateManager {
	state_dir: PathBuf,
	profile: String,
}

impl StateManager {
	/// Create a new state manager
	pub fn new(state_dir: impl Into<PathBuf>, profile: &str) -> Self {
		StateManager { state_dir: state_dir.into(), profile: profile.to_string() }
	}

	/// Load the last adopted server snapshot, `None` if the course was never synced
	pub async fn load_baseline(&self, course_id: u64) -> Result<Option<Course>, StateError> {
		let path = self.baseline_path(course_id);

		if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
			return Ok(None);
		}

		let contents = tokio::fs::read_to_string(&path)
			.await
			.map_err(|e| StateError::LoadFailed { source: Box::new(e) })?;

		serde_json::from_str(&contents).map(Some).map_err(|e| StateError::Corrupted {
			message: format!("Failed to parse baseline {}: {}", path.display(), e),
		})
	}

	/// Store a server snapshot as the baseline of its course
	pub async fn save_baseline(&self, snapshot: &Course) -> Result<(), StateError> {
		tokio::fs::create_dir_all(&self.state_dir)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		let json = serde_json::to_string_pretty(snapshot)
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;

		let path = self.baseline_path(snapshot.id);
		let tmp = path.with_extension("json.tmp");
		tokio::fs::write(&tmp, json)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })?;
		tokio::fs::rename(&tmp, &path)
			.await
			.map_err(|e| StateError::SaveFailed { source: Box::new(e) })
	}

	/// Forget the baseline so the next pull is a two-way diff
	pub async fn clear(&self, course_id: u64) -> Result<(), StateError> {
		let path = self.baseline_path(course_id);

		match tokio::fs::remove_file(&path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StateError::SaveFailed { source: Box::new(e) }),
		}
	}

	/// Get baseline file path
	pub fn baseline_path(&self, course_id: u64) -> PathBuf {
		self.state_dir.join(format!("{}-{}.baseline.json", self.profile, course_id))
	}

	pub fn lock_path(&self, course_id: u64) -> PathBuf {
		self.state_dir.join(format!(".coursesync-{}.lock", course_id))
	}

	/// Acquire the exclusive reconciliation lock of a course
	pub async fn lock(&self, course_id: u64) -> Result<StateLock, StateError> {
		let lock_path = self.lock_path(course_id);

		tokio::fs::create_dir_all(&self.state_dir).await.map_err(|e| StateError::LockFailed {
			message: format!("Failed to create state directory: {}", e),
		})?;

		let mut file = tokio::fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&lock_path)
			.await
			.map_err(|e| {
				if e.kind() == std::io::ErrorKind::AlreadyExists {
					StateError::LockFailed {
						message: format!(
							"Sync of course {} already in progress (lock file exists). If stale, delete: {}",
							course_id,
							lock_path.display()
						),
					}
				} else {
					StateError::LockFailed { message: format!("Failed to create lock file: {}", e) }
				}
			})?;

		// Record our PID for whoever finds a stale lock
		let pid = std::process::id();
		file.write_all(pid.to_string().as_bytes()).await.map_err(|e| StateError::LockFailed {
			message: format!("Failed to write lock file: {}", e),
		})?;

		Ok(StateLock { path: lock_path })
	}
}

/// RAII lock guard for exclusive sync access
#[derive(Debug)]
pub struct StateLock {
	path: PathBuf,
}

impl Drop for StateLock {
	fn drop(&mut self) {
		// Remove lock file on drop (whether success or failure)
		let _ = std::fs::remove_file(&self.path);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_baseline_path() {
		let manager = StateManager::new("/tmp", "myprofile");
		let path = manager.baseline_path(42);
		assert!(path.to_string_lossy().ends_with("myprofile-42.baseline.json"));
	}

	#[tokio::test]
	async fn test_missing_baseline_is_none() {
		let dir = TempDir::new().unwrap();
		let manager = StateManager::new(dir.path(), "default");
		assert!(manager.load_baseline(1).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_baseline_round_trip() {
		let dir = TempDir::new().unwrap();
		let manager = StateManager::new(dir.path().join("state"), "default");
		let course = Course::new(3, "Algorithms");
		manager.save_baseline(&course).await.unwrap();
		assert_eq!(manager.load_baseline(3).await.unwrap(), Some(course));
		manager.clear(3).await.unwrap();
		assert!(manager.load_baseline(3).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_corrupt_baseline() {
		let dir = TempDir::new().unwrap();
		let manager = StateManager::new(dir.path(), "default");
		std::fs::write(manager.baseline_path(5), "{not json").unwrap();
		assert!(matches!(manager.load_baseline(5).await, Err(StateError::Corrupted { .. })));
	}

	#[tokio::test]
	async fn test_lock_is_exclusive_and_released_on_drop() {
		let dir = TempDir::new().unwrap();
		let manager = StateManager::new(dir.path(), "default");
		let lock = manager.lock(1).await.unwrap();
		assert!(matches!(manager.lock(1).await, Err(StateError::LockFailed { .. })));
		// other courses are independent
		let other = manager.lock(2).await.unwrap();
		drop(lock);
		drop(other);
		assert!(manager.lock(1).await.is_ok());
	}
}

// vim: ts=4
