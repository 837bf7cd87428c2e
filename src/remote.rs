//! Course-hosting service boundary

use async_trait::async_trait;
use std::path::PathBuf;

pub use crate::error::RemoteError;
use crate::model::{Course, Lesson, Section, Task};

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the reconciler needs from a course-hosting service
///
/// Create calls return the id assigned by the service. Nothing here
/// deletes remote content.
#[async_trait]
pub trait RemoteCourseService: Send + Sync {
	/// Fetch the current server snapshot of a course
	async fn fetch_snapshot(&mut self, course_id: u64) -> RemoteResult<Course>;

	async fn create_section(&mut self, section: &Section) -> RemoteResult<u64>;

	async fn update_section(&mut self, section: &Section) -> RemoteResult<()>;

	async fn create_lesson(&mut self, lesson: &Lesson) -> RemoteResult<u64>;

	async fn update_lesson(&mut self, lesson: &Lesson) -> RemoteResult<()>;

	async fn create_task(&mut self, task: &Task, lesson_id: u64) -> RemoteResult<u64>;

	async fn update_task(&mut self, task: &Task) -> RemoteResult<()>;

	/// Link a lesson to its section at a position
	async fn create_unit(
		&mut self,
		lesson_id: u64,
		index: u32,
		section_id: Option<u64>,
	) -> RemoteResult<u64>;

	/// Upload name, description and languages of the course
	async fn update_course_info(&mut self, course: &Course) -> RemoteResult<()>;
}

/// Read-only service backed by a snapshot JSON file
///
/// Useful for offline pulls; every write is rejected.
pub struct SnapshotFile {
	path: PathBuf,
}

impl SnapshotFile {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		SnapshotFile { path: path.into() }
	}

	fn read_only<T>(&self) -> RemoteResult<T> {
		Err(RemoteError::Rejected {
			message: format!("snapshot {} is read-only", self.path.display()),
		})
	}
}

#[async_trait]
impl RemoteCourseService for SnapshotFile {
	async fn fetch_snapshot(&mut self, course_id: u64) -> RemoteResult<Course> {
		let text = tokio::fs::read_to_string(&self.path)
			.await
			.map_err(|e| RemoteError::Unreachable {
				message: format!("{}: {}", self.path.display(), e),
			})?;
		let course: Course = serde_json::from_str(&text)
			.map_err(|e| RemoteError::Rejected { message: format!("malformed snapshot: {}", e) })?;
		if course.id != course_id {
			return Err(RemoteError::NotFound { what: format!("course {}", course_id) });
		}
		Ok(course)
	}

	async fn create_section(&mut self, _section: &Section) -> RemoteResult<u64> {
		self.read_only()
	}

	async fn update_section(&mut self, _section: &Section) -> RemoteResult<()> {
		self.read_only()
	}

	async fn create_lesson(&mut self, _lesson: &Lesson) -> RemoteResult<u64> {
		self.read_only()
	}

	async fn update_lesson(&mut self, _lesson: &Lesson) -> RemoteResult<()> {
		self.read_only()
	}

	async fn create_task(&mut self, _task: &Task, _lesson_id: u64) -> RemoteResult<u64> {
		self.read_only()
	}

	async fn update_task(&mut self, _task: &Task) -> RemoteResult<()> {
		self.read_only()
	}

	async fn create_unit(
		&mut self,
		_lesson_id: u64,
		_index: u32,
		_section_id: Option<u64>,
	) -> RemoteResult<u64> {
		self.read_only()
	}

	async fn update_course_info(&mut self, _course: &Course) -> RemoteResult<()> {
		self.read_only()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_snapshot_file_fetch() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("remote.json");
		let course = Course::new(7, "Rust Basics");
		std::fs::write(&path, serde_json::to_string(&course).unwrap()).unwrap();

		let mut remote = SnapshotFile::new(&path);
		let fetched = remote.fetch_snapshot(7).await.unwrap();
		assert_eq!(fetched, course);
		assert!(matches!(remote.fetch_snapshot(8).await, Err(RemoteError::NotFound { .. })));
		assert!(matches!(
			remote.create_lesson(&Lesson::new("x")).await,
			Err(RemoteError::Rejected { .. })
		));
	}

	#[tokio::test]
	async fn test_missing_snapshot_is_unreachable() {
		let dir = TempDir::new().unwrap();
		let mut remote = SnapshotFile::new(dir.path().join("nope.json"));
		assert!(matches!(remote.fetch_snapshot(1).await, Err(RemoteError::Unreachable { .. })));
	}
}

// vim: ts=4
