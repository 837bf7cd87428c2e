//! Applies an action plan to the course tree, the course directory and the server
//!
//! Every action is idempotent: creating an item whose id is already in the
//! tree, deleting one that is gone, or renaming one that already carries the
//! new name does nothing. A directory standing in the way of a creation or
//! rename is moved aside under a prefixed name, repeating the prefix until
//! the name is free. Cancellation is checked between actions only.
//!
//! There is no rollback. Whatever ran before a failure stays applied, and
//! sibling indices are renumbered 1..N before returning in every case.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::callbacks::{NoCallbacks, SyncCallbacks, SyncEvent};
use crate::error::SyncError;
use crate::logging::*;
use crate::model::{Course, ItemKey, Lesson, Node, Parent, Section, Task};
use crate::plan::{Action, ActionPlan, MetadataUpdate, Upload};
use crate::remote::RemoteCourseService;
use crate::diff::AdditionalMaterials;
use crate::storage::{validate_name, validate_relative, LocalStorage};
use crate::strategies::ErrorPolicy;
use crate::sync::CancelToken;

static NO_CALLBACKS: NoCallbacks = NoCallbacks;

/// Default prefix for directories moved out of the way
pub const DEFAULT_ASIDE_PREFIX: &str = "old_";

/// What a completed run did
#[derive(Debug, Default)]
pub struct ExecutionReport {
	pub total: usize,
	/// Plan positions of applied actions
	pub applied: Vec<usize>,
	/// Plan positions skipped after an ancestor failed
	pub skipped: Vec<usize>,
	/// Directories moved aside, as (original path, new path)
	pub moved_aside: Vec<(String, String)>,
	/// Failures tolerated under [`ErrorPolicy::SkipDependents`]
	pub failures: Vec<(usize, SyncError)>,
}

impl ExecutionReport {
	fn new(total: usize) -> Self {
		ExecutionReport { total, ..Default::default() }
	}

	pub fn is_complete(&self) -> bool {
		self.applied.len() == self.total
	}
}

/// One directory or file of a materialized subtree
enum Entry {
	Dir(PathBuf),
	File(PathBuf, String),
}

fn section_layout(path: &Path, section: &Section, out: &mut Vec<Entry>) -> Result<(), SyncError> {
	out.push(Entry::Dir(path.to_path_buf()));
	for lesson in &section.lessons {
		validate_name(&lesson.name)?;
		lesson_layout(&path.join(&lesson.name), lesson, out)?;
	}
	Ok(())
}

fn lesson_layout(path: &Path, lesson: &Lesson, out: &mut Vec<Entry>) -> Result<(), SyncError> {
	out.push(Entry::Dir(path.to_path_buf()));
	for task in &lesson.tasks {
		validate_name(&task.name)?;
		task_layout(&path.join(&task.name), task, out);
	}
	Ok(())
}

fn task_layout(path: &Path, task: &Task, out: &mut Vec<Entry>) {
	out.push(Entry::Dir(path.to_path_buf()));
	for file in &task.files {
		out.push(Entry::File(path.join(&file.name), file.text.clone()));
	}
	for (name, text) in &task.additional_files {
		out.push(Entry::File(path.join(name), text.clone()));
	}
}

fn layout(path: &Path, node: &Node) -> Result<Vec<Entry>, SyncError> {
	let mut out = Vec::new();
	match node {
		Node::Section(section) => section_layout(path, section, &mut out)?,
		Node::Lesson(lesson) => lesson_layout(path, lesson, &mut out)?,
		Node::Task(task) => task_layout(path, task, &mut out),
	}
	Ok(out)
}

fn not_found(what: impl ToString) -> SyncError {
	SyncError::NotFound { what: what.to_string() }
}

/// Whether `action` touches an item that failed, or a descendant of one
fn blocked(course: &Course, action: &Action, failed: &HashSet<ItemKey>) -> bool {
	let mut keys: Vec<ItemKey> =
		action.subject().into_iter().chain(action.container().and_then(|p| p.key())).collect();
	while let Some(key) = keys.pop() {
		if failed.contains(&key) {
			return true;
		}
		if let Some(parent) = course.parent_of(key).and_then(|p| p.key()) {
			keys.push(parent);
		}
	}
	false
}

fn apply_metadata(course: &mut Course, update: &MetadataUpdate) -> Result<(), SyncError> {
	match update {
		MetadataUpdate::Course(info) => {
			course.name = info.name.clone();
			course.description = info.description.clone();
			course.human_language = info.human_language.clone();
			course.language_id = info.language_id.clone();
		}
		MetadataUpdate::Section { id, index } => {
			course.section_mut(*id).ok_or_else(|| not_found(ItemKey::Section(*id)))?.index = *index;
		}
		MetadataUpdate::Lesson { id, index, is_public } => {
			let lesson = course.lesson_mut(*id).ok_or_else(|| not_found(ItemKey::Lesson(*id)))?;
			lesson.index = *index;
			lesson.is_public = *is_public;
		}
		MetadataUpdate::Task { id, index, description_text, update_date } => {
			let task = course.task_mut(*id).ok_or_else(|| not_found(ItemKey::Task(*id)))?;
			task.index = *index;
			if let Some(text) = description_text {
				task.description_text = text.clone();
			}
			if let Some(date) = update_date {
				task.update_date = *date;
			}
		}
	}
	Ok(())
}

/// Post a local lesson with its tasks and link it to its container
///
/// Ids are written back into the tree as soon as the service assigns them.
async fn push_lesson(
	remote: &mut dyn RemoteCourseService,
	course: &mut Course,
	parent: Parent,
	index: u32,
) -> Result<(), SyncError> {
	let section_id = match parent {
		Parent::Section(id) => Some(id),
		_ => None,
	};
	let mut lesson = course
		.lesson_at_mut(parent, index)
		.map(|l| l.clone())
		.ok_or_else(|| not_found(format!("lesson at position {} of {}", index, parent)))?;
	lesson.section_id = section_id;

	let lesson_id = remote.create_lesson(&lesson).await?;
	info!("lesson '{}' posted as #{}", lesson.name, lesson_id);
	if let Some(local) = course.lesson_at_mut(parent, index) {
		local.id = lesson_id;
	}

	let unit_section = section_id.or(course.lessons_section_id);
	let unit_id = remote.create_unit(lesson_id, index, unit_section).await?;
	if let Some(local) = course.lesson_mut(lesson_id) {
		local.unit_id = Some(unit_id);
	}

	for task in &lesson.tasks {
		let task_id = remote.create_task(task, lesson_id).await?;
		let slot = course
			.lesson_mut(lesson_id)
			.and_then(|l| l.tasks.iter_mut().find(|t| t.index == task.index));
		if let Some(slot) = slot {
			slot.id = task_id;
			slot.lesson_id = lesson_id;
		}
	}
	Ok(())
}

async fn push(
	remote: &mut dyn RemoteCourseService,
	course: &mut Course,
	upload: &Upload,
) -> Result<(), SyncError> {
	match upload {
		Upload::CourseInfo => remote.update_course_info(course).await?,
		Upload::CreateSection { section } => {
			let local = course
				.section_at_mut(section.index)
				.map(|s| s.clone())
				.ok_or_else(|| not_found(format!("section at position {}", section.index)))?;
			let section_id = remote.create_section(&local).await?;
			info!("section '{}' posted as #{}", local.name, section_id);
			if let Some(slot) = course.section_at_mut(section.index) {
				slot.id = section_id;
			}
			for lesson in &local.lessons {
				push_lesson(remote, course, Parent::Section(section_id), lesson.index).await?;
			}
		}
		Upload::UpdateSection { id } => {
			let section = course.section(*id).ok_or_else(|| not_found(ItemKey::Section(*id)))?;
			remote.update_section(section).await?;
		}
		Upload::CreateLesson { parent, lesson } => {
			push_lesson(remote, course, *parent, lesson.index).await?;
		}
		Upload::UpdateLesson { id } => {
			let lesson = course.lesson(*id).ok_or_else(|| not_found(ItemKey::Lesson(*id)))?;
			remote.update_lesson(lesson).await?;
		}
		Upload::CreateTask { lesson_id, task } => {
			let local = course
				.lesson(*lesson_id)
				.and_then(|l| l.tasks.iter().find(|t| t.index == task.index))
				.cloned()
				.ok_or_else(|| {
					not_found(format!("task '{}' in lesson #{}", task.name, lesson_id))
				})?;
			let task_id = remote.create_task(&local, *lesson_id).await?;
			let slot = course
				.lesson_mut(*lesson_id)
				.and_then(|l| l.tasks.iter_mut().find(|t| t.index == task.index));
			if let Some(slot) = slot {
				slot.id = task_id;
			}
		}
		Upload::UpdateTask { id } => {
			let task = course.task(*id).ok_or_else(|| not_found(ItemKey::Task(*id)))?;
			remote.update_task(task).await?;
		}
	}
	Ok(())
}

/// Runs the actions of a plan in order
pub struct Executor<'a> {
	storage: &'a mut dyn LocalStorage,
	remote: Option<&'a mut dyn RemoteCourseService>,
	callbacks: &'a dyn SyncCallbacks,
	policy: ErrorPolicy,
	aside_prefix: String,
	cancel: Option<CancelToken>,
}

impl<'a> Executor<'a> {
	pub fn new(storage: &'a mut dyn LocalStorage) -> Self {
		Executor {
			storage,
			remote: None,
			callbacks: &NO_CALLBACKS,
			policy: ErrorPolicy::default(),
			aside_prefix: DEFAULT_ASIDE_PREFIX.to_string(),
			cancel: None,
		}
	}

	/// Service used by upload actions
	pub fn with_remote(mut self, remote: &'a mut dyn RemoteCourseService) -> Self {
		self.remote = Some(remote);
		self
	}

	pub fn with_callbacks(mut self, callbacks: &'a dyn SyncCallbacks) -> Self {
		self.callbacks = callbacks;
		self
	}

	pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn aside_prefix(mut self, prefix: &str) -> Self {
		self.aside_prefix = prefix.to_string();
		self
	}

	pub fn cancel_token(mut self, token: CancelToken) -> Self {
		self.cancel = Some(token);
		self
	}

	fn cancelled(&self) -> bool {
		self.cancel.as_ref().map_or(false, |t| t.is_cancelled())
	}

	/// Apply every action of `plan` to `course`
	///
	/// Under [`ErrorPolicy::Abort`] the first failure stops the run. Under
	/// [`ErrorPolicy::SkipDependents`] later actions on the failed item and
	/// its descendants are skipped. Any failure ends in
	/// [`SyncError::PartialApply`].
	pub async fn execute(
		&mut self,
		course: &mut Course,
		plan: &ActionPlan,
	) -> Result<ExecutionReport, SyncError> {
		let total = plan.len();
		let mut report = ExecutionReport::new(total);
		let mut failed: HashSet<ItemKey> = HashSet::new();

		for (i, action) in plan.actions.iter().enumerate() {
			let step = i + 1;
			if self.cancelled() {
				info!("cancelled after {} of {} actions", report.applied.len(), total);
				course.normalize();
				return Err(SyncError::Cancelled);
			}
			if !failed.is_empty() && blocked(course, action, &failed) {
				debug!("[{}/{}] skipping {}", step, total, action);
				report.skipped.push(i);
				self.callbacks.on_event(&SyncEvent::ActionSkipped {
					step,
					total,
					description: action.to_string(),
				});
				continue;
			}

			debug!("[{}/{}] {}", step, total, action);
			match self.apply(course, action, &mut report).await {
				Ok(()) => {
					report.applied.push(i);
					self.callbacks.on_event(&SyncEvent::ActionApplied {
						step,
						total,
						description: action.to_string(),
					});
				}
				Err(e) => {
					warn!("[{}/{}] {} failed: {}", step, total, action, e);
					self.callbacks.on_event(&SyncEvent::ActionFailed {
						step,
						total,
						error: e.to_string(),
					});
					match self.policy {
						ErrorPolicy::Abort => {
							course.normalize();
							return Err(SyncError::PartialApply {
								applied: report.applied.len(),
								total,
								source: Box::new(e),
							});
						}
						ErrorPolicy::SkipDependents => {
							if let Some(key) = action.subject().filter(|k| k.id() != 0) {
								failed.insert(key);
							}
							report.failures.push((i, e));
						}
					}
				}
			}
		}

		course.normalize();
		if !report.failures.is_empty() {
			let applied = report.applied.len();
			let (_, first) = report.failures.remove(0);
			return Err(SyncError::PartialApply { applied, total, source: Box::new(first) });
		}
		Ok(report)
	}

	async fn apply(
		&mut self,
		course: &mut Course,
		action: &Action,
		report: &mut ExecutionReport,
	) -> Result<(), SyncError> {
		match action {
			Action::CreateDirectory { parent, node } => {
				self.create(course, *parent, node, report).await
			}
			Action::DeleteDirectory { target } => self.delete(course, *target).await,
			Action::RenameDirectory { target, new_name } => {
				self.rename(course, *target, new_name, report).await
			}
			Action::WriteTaskContent { task } => self.write_task(course, task).await,
			Action::SkipProtectedTask { id, name } => {
				info!("kept files of solved task #{} '{}'", id, name);
				Ok(())
			}
			Action::UpdateMetadataOnly(update) => apply_metadata(course, update),
			Action::WriteAdditionalFiles(materials) => {
				self.write_additional_files(course, materials).await
			}
			Action::UploadItem(upload) => {
				let remote = self.remote.as_deref_mut().ok_or_else(|| SyncError::InvalidConfig {
					message: "uploading requires a remote course service".to_string(),
				})?;
				push(remote, course, upload).await
			}
		}
	}

	/// Rename the child of `parent` called `name` out of the way, on disk and in the tree
	async fn move_aside(
		&mut self,
		course: &mut Course,
		parent: Parent,
		name: &str,
		report: &mut ExecutionReport,
	) -> Result<String, SyncError> {
		if self.aside_prefix.is_empty() {
			return Err(SyncError::InvalidConfig { message: "aside prefix is empty".to_string() });
		}
		let container = course.container_path(parent).ok_or_else(|| not_found(parent))?;
		let mut aside = format!("{}{}", self.aside_prefix, name);
		while course.child_named(parent, &aside)
			|| self.storage.exists(&container.join(&aside)).await
		{
			aside = format!("{}{}", self.aside_prefix, aside);
		}

		let from = container.join(name);
		if self.storage.exists(&from).await {
			self.storage.rename_directory(&from, &aside).await?;
		}
		course.rename_child(parent, name, &aside);

		let moved_to = container.join(&aside);
		let conflict = SyncError::DirectoryConflict {
			path: from.display().to_string(),
			moved_to: moved_to.display().to_string(),
		};
		warn!("{}", conflict);
		self.callbacks.on_event(&SyncEvent::MovedAside {
			path: from.display().to_string(),
			moved_to: moved_to.display().to_string(),
		});
		report.moved_aside.push((from.display().to_string(), moved_to.display().to_string()));
		Ok(aside)
	}

	async fn create(
		&mut self,
		course: &mut Course,
		parent: Parent,
		node: &Node,
		report: &mut ExecutionReport,
	) -> Result<(), SyncError> {
		let key = node.key();
		if key.id() != 0 && course.contains(key) {
			debug!("{} already present", key);
			return Ok(());
		}
		validate_name(node.name())?;
		let container = course.container_path(parent).ok_or_else(|| not_found(parent))?;
		let path = container.join(node.name());
		if course.child_named(parent, node.name()) || self.storage.exists(&path).await {
			self.move_aside(course, parent, node.name(), report).await?;
		}

		for entry in layout(&path, node)? {
			match entry {
				Entry::Dir(dir) => self.storage.create_directory(&dir).await?,
				Entry::File(file, text) => self.storage.write_file(&file, &text).await?,
			}
		}
		course.insert(parent, node.clone())
	}

	async fn delete(&mut self, course: &mut Course, target: ItemKey) -> Result<(), SyncError> {
		let Some(path) = course.path_of(target) else {
			debug!("{} already gone", target);
			return Ok(());
		};
		self.storage.delete_directory(&path).await?;
		course.remove(target);
		Ok(())
	}

	async fn rename(
		&mut self,
		course: &mut Course,
		target: ItemKey,
		new_name: &str,
		report: &mut ExecutionReport,
	) -> Result<(), SyncError> {
		validate_name(new_name)?;
		let current = course.item_name(target).ok_or_else(|| not_found(target))?.to_string();
		if current == new_name {
			return Ok(());
		}
		let parent = course.parent_of(target).ok_or_else(|| not_found(target))?;
		let container = course.container_path(parent).ok_or_else(|| not_found(parent))?;
		let destination = container.join(new_name);
		if course.child_named(parent, new_name) || self.storage.exists(&destination).await {
			self.move_aside(course, parent, new_name, report).await?;
		}

		let source = container.join(&current);
		if self.storage.exists(&source).await {
			self.storage.rename_directory(&source, new_name).await?;
		} else {
			warn!("directory of {} is missing, creating {}", target, destination.display());
			self.storage.create_directory(&destination).await?;
		}
		course.rename(target, new_name);
		Ok(())
	}

	/// Write course-wide files relative to the course root
	async fn write_additional_files(
		&mut self,
		course: &mut Course,
		materials: &AdditionalMaterials,
	) -> Result<(), SyncError> {
		for path in materials.files.keys() {
			validate_relative(Path::new(path))?;
		}
		for (path, text) in &materials.files {
			self.storage.write_file(Path::new(path), text).await?;
		}
		course.additional_files = materials.files.clone();
		course.additional_materials_update_date = materials.update_date;
		Ok(())
	}

	/// Replace a task's files wholesale, keeping its place and progress in the tree
	async fn write_task(&mut self, course: &mut Course, task: &Task) -> Result<(), SyncError> {
		let key = ItemKey::Task(task.id);
		let old = course.task(task.id).cloned().ok_or_else(|| not_found(key))?;
		let framework = course.lesson_of_task(task.id).map_or(false, |l| l.framework);
		let path = course.path_of(key).ok_or_else(|| not_found(key))?;

		let mut replacement = task.clone();
		replacement.name = old.name.clone();
		replacement.index = old.index;
		replacement.lesson_id = old.lesson_id;
		replacement.status = old.status;
		if framework {
			replacement.carry_student_answers(&old);
		}

		self.storage.delete_directory(&path).await?;
		let mut entries = Vec::new();
		task_layout(&path, &replacement, &mut entries);
		for entry in entries {
			match entry {
				Entry::Dir(dir) => self.storage.create_directory(&dir).await?,
				Entry::File(file, text) => self.storage.write_file(&file, &text).await?,
			}
		}

		if let Some(slot) = course.task_mut(task.id) {
			*slot = replacement;
		}
		Ok(())
	}
}


// vim: ts=4
