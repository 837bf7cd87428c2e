//! Shared fakes and course builders for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use coursesync::error::SyncError;
use coursesync::model::{CheckStatus, Course, Lesson, Section, Task, TaskFile, TaskKind};
use coursesync::remote::{RemoteCourseService, RemoteError, RemoteResult};
use coursesync::storage::{validate_relative, LocalStorage, StorageResult};

// ============================================================================
// In-memory LocalStorage
// ============================================================================

#[derive(Debug, Default)]
struct MemoryFs {
	dirs: BTreeSet<PathBuf>,
	files: BTreeMap<PathBuf, String>,
	/// Writes below this path fail
	broken: Option<PathBuf>,
}

impl MemoryFs {
	fn add_dirs(&mut self, path: &Path) {
		for ancestor in path.ancestors() {
			if !ancestor.as_os_str().is_empty() {
				self.dirs.insert(ancestor.to_path_buf());
			}
		}
	}

	fn check(&self, path: &Path) -> StorageResult<()> {
		validate_relative(path)?;
		match &self.broken {
			Some(broken) if path.starts_with(broken) => Err(SyncError::Io(std::io::Error::new(
				std::io::ErrorKind::PermissionDenied,
				format!("{} is read-only", path.display()),
			))),
			_ => Ok(()),
		}
	}
}

/// [`LocalStorage`] kept in memory; clones share the same tree
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
	fs: Arc<Mutex<MemoryFs>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make every write below `path` fail with a permission error
	pub fn break_writes_under(&self, path: &str) {
		self.fs.lock().unwrap().broken = Some(PathBuf::from(path));
	}

	pub fn file(&self, path: &str) -> Option<String> {
		self.fs.lock().unwrap().files.get(Path::new(path)).cloned()
	}

	pub fn has_dir(&self, path: &str) -> bool {
		self.fs.lock().unwrap().dirs.contains(Path::new(path))
	}

	/// Every file path with its content, sorted
	pub fn files(&self) -> BTreeMap<PathBuf, String> {
		self.fs.lock().unwrap().files.clone()
	}

	pub fn dirs(&self) -> BTreeSet<PathBuf> {
		self.fs.lock().unwrap().dirs.clone()
	}

	/// Seed a file, as if the learner had written it
	pub fn put(&self, path: &str, content: &str) {
		let mut fs = self.fs.lock().unwrap();
		let path = PathBuf::from(path);
		if let Some(parent) = path.parent() {
			fs.add_dirs(parent);
		}
		fs.files.insert(path, content.to_string());
	}
}

#[async_trait]
impl LocalStorage for MemoryStorage {
	async fn create_directory(&mut self, path: &Path) -> StorageResult<()> {
		let mut fs = self.fs.lock().unwrap();
		fs.check(path)?;
		fs.add_dirs(path);
		Ok(())
	}

	async fn delete_directory(&mut self, path: &Path) -> StorageResult<()> {
		let mut fs = self.fs.lock().unwrap();
		fs.check(path)?;
		fs.dirs.retain(|d| !d.starts_with(path));
		fs.files.retain(|f, _| !f.starts_with(path));
		Ok(())
	}

	async fn rename_directory(&mut self, path: &Path, new_name: &str) -> StorageResult<()> {
		let mut fs = self.fs.lock().unwrap();
		fs.check(path)?;
		let to = path.parent().unwrap_or(Path::new("")).join(new_name);
		if fs.dirs.contains(&to) {
			return Err(SyncError::DirectoryConflict {
				path: to.display().to_string(),
				moved_to: String::new(),
			});
		}
		let moved = |p: &Path| to.join(p.strip_prefix(path).unwrap());
		let dirs: BTreeSet<PathBuf> =
			fs.dirs.iter().map(|d| if d.starts_with(path) { moved(d) } else { d.clone() }).collect();
		let files: BTreeMap<PathBuf, String> = fs
			.files
			.iter()
			.map(|(f, c)| (if f.starts_with(path) { moved(f) } else { f.clone() }, c.clone()))
			.collect();
		fs.dirs = dirs;
		fs.files = files;
		Ok(())
	}

	async fn write_file(&mut self, path: &Path, content: &str) -> StorageResult<()> {
		let mut fs = self.fs.lock().unwrap();
		fs.check(path)?;
		if let Some(parent) = path.parent() {
			fs.add_dirs(parent);
		}
		fs.files.insert(path.to_path_buf(), content.to_string());
		Ok(())
	}

	async fn read_file(&self, path: &Path) -> StorageResult<String> {
		let fs = self.fs.lock().unwrap();
		fs.files.get(path).cloned().ok_or_else(|| {
			SyncError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("{} not found", path.display()),
			))
		})
	}

	async fn exists(&self, path: &Path) -> bool {
		let fs = self.fs.lock().unwrap();
		fs.dirs.contains(path) || fs.files.contains_key(path)
	}
}

// ============================================================================
// Scripted RemoteCourseService
// ============================================================================

#[derive(Debug)]
struct RemoteState {
	snapshot: Option<Course>,
	calls: Vec<String>,
	next_id: u64,
	fetches: usize,
}

/// Service answering fetches from a fixed snapshot and recording writes
#[derive(Debug, Clone)]
pub struct FakeRemote {
	state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
	/// Serve `snapshot`; ids handed out by create calls start at 1000
	pub fn new(snapshot: Course) -> Self {
		FakeRemote {
			state: Arc::new(Mutex::new(RemoteState {
				snapshot: Some(snapshot),
				calls: Vec::new(),
				next_id: 1000,
				fetches: 0,
			})),
		}
	}

	/// A service that cannot be reached
	pub fn unreachable() -> Self {
		FakeRemote {
			state: Arc::new(Mutex::new(RemoteState {
				snapshot: None,
				calls: Vec::new(),
				next_id: 1000,
				fetches: 0,
			})),
		}
	}

	pub fn set_snapshot(&self, snapshot: Course) {
		self.state.lock().unwrap().snapshot = Some(snapshot);
	}

	pub fn calls(&self) -> Vec<String> {
		self.state.lock().unwrap().calls.clone()
	}

	pub fn fetches(&self) -> usize {
		self.state.lock().unwrap().fetches
	}

	fn record(&self, call: String) {
		self.state.lock().unwrap().calls.push(call);
	}

	fn next_id(&self) -> u64 {
		let mut state = self.state.lock().unwrap();
		let id = state.next_id;
		state.next_id += 1;
		id
	}
}

#[async_trait]
impl RemoteCourseService for FakeRemote {
	async fn fetch_snapshot(&mut self, course_id: u64) -> RemoteResult<Course> {
		let mut state = self.state.lock().unwrap();
		state.fetches += 1;
		match &state.snapshot {
			None => Err(RemoteError::Unreachable { message: "connection refused".to_string() }),
			Some(course) if course.id != course_id => {
				Err(RemoteError::NotFound { what: format!("course #{}", course_id) })
			}
			Some(course) => Ok(course.clone()),
		}
	}

	async fn create_section(&mut self, section: &Section) -> RemoteResult<u64> {
		let id = self.next_id();
		self.record(format!("create_section {} -> {}", section.name, id));
		Ok(id)
	}

	async fn update_section(&mut self, section: &Section) -> RemoteResult<()> {
		self.record(format!("update_section {}", section.id));
		Ok(())
	}

	async fn create_lesson(&mut self, lesson: &Lesson) -> RemoteResult<u64> {
		let id = self.next_id();
		self.record(format!("create_lesson {} -> {}", lesson.name, id));
		Ok(id)
	}

	async fn update_lesson(&mut self, lesson: &Lesson) -> RemoteResult<()> {
		self.record(format!("update_lesson {}", lesson.id));
		Ok(())
	}

	async fn create_task(&mut self, task: &Task, lesson_id: u64) -> RemoteResult<u64> {
		let id = self.next_id();
		self.record(format!("create_task {} in {} -> {}", task.name, lesson_id, id));
		Ok(id)
	}

	async fn update_task(&mut self, task: &Task) -> RemoteResult<()> {
		self.record(format!("update_task {}", task.id));
		Ok(())
	}

	async fn create_unit(&mut self, lesson_id: u64, index: u32, section_id: Option<u64>) -> RemoteResult<u64> {
		let id = self.next_id();
		self.record(format!("create_unit {} at {} in {:?}", lesson_id, index, section_id));
		Ok(id)
	}

	async fn update_course_info(&mut self, course: &Course) -> RemoteResult<()> {
		self.record(format!("update_course_info {}", course.name));
		Ok(())
	}
}

// ============================================================================
// Course builders
// ============================================================================

/// Midnight UTC of day `day` in January 2024
pub fn day(day: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

/// Edu task with a single file
pub fn task(id: u64, name: &str, file: &str, text: &str) -> Task {
	let mut t = Task::new(name, TaskKind::Edu);
	t.id = id;
	t.update_date = day(1);
	t.add_file(TaskFile::new(file, text));
	t
}

pub fn solved(mut task: Task) -> Task {
	task.status = CheckStatus::Solved;
	task
}

pub fn lesson(id: u64, name: &str, tasks: Vec<Task>) -> Lesson {
	let mut l = Lesson::new(name);
	l.id = id;
	for t in tasks {
		l.add_task(t);
	}
	l
}

pub fn section(id: u64, name: &str, lessons: Vec<Lesson>) -> Section {
	let mut s = Section::new(name);
	s.id = id;
	for l in lessons {
		s.add_lesson(l);
	}
	s
}

/// Course with top-level lessons only
pub fn course(id: u64, lessons: Vec<Lesson>) -> Course {
	let mut c = Course::new(id, "Kotlin Koans");
	for l in lessons {
		c.add_lesson(l);
	}
	c
}

/// Indices of every sibling list, in tree order
pub fn sibling_indices(course: &Course) -> Vec<Vec<u32>> {
	let mut out = vec![course.items.iter().map(|i| coursesync::StudyItem::index(i)).collect::<Vec<_>>()];
	for section in course.sections() {
		out.push(section.lessons.iter().map(|l| l.index).collect());
	}
	for lesson in course.all_lessons() {
		out.push(lesson.tasks.iter().map(|t| t.index).collect());
	}
	out
}

// vim: ts=4
