//! Translation of a change set into ordered actions
//!
//! Pull plans run in four phases: course metadata, deletions (sections,
//! lessons, tasks), renames and in-place updates, then creations. Newer
//! course-wide files are written last. Sections
//! always precede their lessons and lessons their tasks within a phase, and
//! nothing is created before every deletion has run, so a replacement item
//! with a reused name never collides with the item it replaces.
//!
//! Push plans upload creations and updates. Deletions are never pushed.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::diff::{AdditionalMaterials, ChangeSet, CourseInfo, InfoChange};
use crate::logging::*;
use crate::model::{ItemKey, Lesson, Node, Parent, Section, Task};
use crate::strategies::Direction;

/// Metadata refreshed in place, without touching authored content
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
	Course(CourseInfo),
	Section { id: u64, index: u32 },
	Lesson { id: u64, index: u32, is_public: bool },
	Task {
		id: u64,
		index: u32,
		description_text: Option<String>,
		update_date: Option<DateTime<Utc>>,
	},
}

impl MetadataUpdate {
	pub fn key(&self) -> Option<ItemKey> {
		match self {
			MetadataUpdate::Course(_) => None,
			MetadataUpdate::Section { id, .. } => Some(ItemKey::Section(*id)),
			MetadataUpdate::Lesson { id, .. } => Some(ItemKey::Lesson(*id)),
			MetadataUpdate::Task { id, .. } => Some(ItemKey::Task(*id)),
		}
	}
}

/// A call to the course-hosting service
#[derive(Debug, Clone, PartialEq)]
pub enum Upload {
	CourseInfo,
	/// New section with its lessons and tasks
	CreateSection { section: Section },
	UpdateSection { id: u64 },
	/// New lesson with its tasks, followed by a unit linking it to `parent`
	CreateLesson { parent: Parent, lesson: Lesson },
	UpdateLesson { id: u64 },
	CreateTask { lesson_id: u64, task: Task },
	UpdateTask { id: u64 },
}

/// One atomic, idempotent step of a plan
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
	/// Materialize a subtree under `parent`
	CreateDirectory { parent: Parent, node: Node },
	DeleteDirectory { target: ItemKey },
	RenameDirectory { target: ItemKey, new_name: String },
	/// Replace files, placeholders and additional files of a task wholesale
	WriteTaskContent { task: Task },
	/// A solved task whose incoming content was not applied
	SkipProtectedTask { id: u64, name: String },
	UpdateMetadataOnly(MetadataUpdate),
	/// Write course-wide files at the course root
	WriteAdditionalFiles(AdditionalMaterials),
	UploadItem(Upload),
}

impl Action {
	/// The item this action works on, `None` for course-level actions
	pub fn subject(&self) -> Option<ItemKey> {
		match self {
			Action::CreateDirectory { node, .. } => Some(node.key()),
			Action::DeleteDirectory { target } | Action::RenameDirectory { target, .. } => {
				Some(*target)
			}
			Action::WriteTaskContent { task } => Some(ItemKey::Task(task.id)),
			Action::SkipProtectedTask { id, .. } => Some(ItemKey::Task(*id)),
			Action::UpdateMetadataOnly(update) => update.key(),
			Action::WriteAdditionalFiles(_) => None,
			Action::UploadItem(upload) => match upload {
				Upload::CourseInfo => None,
				Upload::CreateSection { section } => Some(ItemKey::Section(section.id)),
				Upload::UpdateSection { id } => Some(ItemKey::Section(*id)),
				Upload::CreateLesson { lesson, .. } => Some(ItemKey::Lesson(lesson.id)),
				Upload::UpdateLesson { id } => Some(ItemKey::Lesson(*id)),
				Upload::CreateTask { task, .. } => Some(ItemKey::Task(task.id)),
				Upload::UpdateTask { id } => Some(ItemKey::Task(*id)),
			},
		}
	}

	/// The container a creation lands in
	pub fn container(&self) -> Option<Parent> {
		match self {
			Action::CreateDirectory { parent, .. } => Some(*parent),
			Action::UploadItem(Upload::CreateLesson { parent, .. }) => Some(*parent),
			Action::UploadItem(Upload::CreateTask { lesson_id, .. }) => {
				Some(Parent::Lesson(*lesson_id))
			}
			Action::UploadItem(Upload::CreateSection { .. }) => Some(Parent::Course),
			_ => None,
		}
	}
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Action::CreateDirectory { parent, node } => {
				write!(f, "create {} '{}' in {}", node.kind_name(), node.name(), parent)
			}
			Action::DeleteDirectory { target } => write!(f, "delete {}", target),
			Action::RenameDirectory { target, new_name } => {
				write!(f, "rename {} to '{}'", target, new_name)
			}
			Action::WriteTaskContent { task } => {
				write!(f, "write content of task #{} '{}'", task.id, task.name)
			}
			Action::SkipProtectedTask { id, name } => {
				write!(f, "keep solved task #{} '{}'", id, name)
			}
			Action::UpdateMetadataOnly(update) => match update {
				MetadataUpdate::Course(info) => write!(f, "update course info '{}'", info.name),
				MetadataUpdate::Section { id, index } => {
					write!(f, "update section #{} (index {})", id, index)
				}
				MetadataUpdate::Lesson { id, index, .. } => {
					write!(f, "update lesson #{} (index {})", id, index)
				}
				MetadataUpdate::Task { id, index, description_text, .. } => {
					write!(f, "update task #{} (index {}", id, index)?;
					if description_text.is_some() {
						write!(f, ", description")?;
					}
					write!(f, ")")
				}
			},
			Action::WriteAdditionalFiles(materials) => {
				write!(f, "write {} additional files", materials.files.len())
			}
			Action::UploadItem(upload) => match upload {
				Upload::CourseInfo => write!(f, "upload course info"),
				Upload::CreateSection { section } => {
					write!(f, "upload new section '{}'", section.name)
				}
				Upload::UpdateSection { id } => write!(f, "upload section #{}", id),
				Upload::CreateLesson { lesson, parent } => {
					write!(f, "upload new lesson '{}' in {}", lesson.name, parent)
				}
				Upload::UpdateLesson { id } => write!(f, "upload lesson #{}", id),
				Upload::CreateTask { task, lesson_id } => {
					write!(f, "upload new task '{}' in lesson #{}", task.name, lesson_id)
				}
				Upload::UpdateTask { id } => write!(f, "upload task #{}", id),
			},
		}
	}
}

/// Ordered actions for one direction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionPlan {
	pub direction: Direction,
	pub actions: Vec<Action>,
}

impl ActionPlan {
	pub fn is_empty(&self) -> bool {
		self.actions.is_empty()
	}

	pub fn len(&self) -> usize {
		self.actions.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Action> {
		self.actions.iter()
	}
}

impl fmt::Display for ActionPlan {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.actions.is_empty() {
			return write!(f, "{}: nothing to do", self.direction);
		}
		write!(f, "{}: {} actions", self.direction, self.actions.len())?;
		for (i, action) in self.actions.iter().enumerate() {
			write!(f, "\n{:>4}. {}", i + 1, action)?;
		}
		Ok(())
	}
}

/// Builds an [`ActionPlan`] from a [`ChangeSet`]
#[derive(Debug, Clone, Copy)]
pub struct Planner {
	direction: Direction,
	protect_solved: bool,
}

impl Planner {
	pub fn new(direction: Direction) -> Self {
		Planner { direction, protect_solved: direction.protects_solved() }
	}

	/// Override whether solved tasks keep their content on pull
	pub fn protect_solved(mut self, protect: bool) -> Self {
		self.protect_solved = protect;
		self
	}

	pub fn plan(&self, changes: &ChangeSet) -> ActionPlan {
		let actions = match self.direction {
			Direction::Pull => self.plan_pull(changes),
			Direction::Push => self.plan_push(changes),
		};
		debug!("planned {} {} actions", actions.len(), self.direction);
		ActionPlan { direction: self.direction, actions }
	}

	fn plan_pull(&self, changes: &ChangeSet) -> Vec<Action> {
		let mut actions = Vec::new();

		if let Some(info) = &changes.course_info {
			actions.push(Action::UpdateMetadataOnly(MetadataUpdate::Course(info.clone())));
		}

		for change in &changes.sections.deleted {
			actions.push(Action::DeleteDirectory { target: ItemKey::Section(change.item.id) });
		}
		for change in &changes.lessons.deleted {
			actions.push(Action::DeleteDirectory { target: ItemKey::Lesson(change.item.id) });
		}
		for change in &changes.tasks.deleted {
			let task = &change.item;
			if task.is_solved() {
				warn!("solved task #{} '{}' was removed from the server", task.id, task.name);
			}
			actions.push(Action::DeleteDirectory { target: ItemKey::Task(task.id) });
		}

		for change in &changes.sections.info_changed {
			push_info_actions(&mut actions, change, |id, index, _| {
				MetadataUpdate::Section { id, index }
			});
		}
		for change in &changes.lessons.info_changed {
			push_info_actions(&mut actions, change, |id, index, is_public| MetadataUpdate::Lesson {
				id,
				index,
				is_public,
			});
		}
		for change in &changes.tasks.info_changed {
			push_info_actions(&mut actions, change, |id, index, _| MetadataUpdate::Task {
				id,
				index,
				description_text: None,
				update_date: None,
			});
		}
		for change in &changes.content_changed {
			let (local, incoming) = (&change.old, &change.new);
			if self.protect_solved && local.is_protected() {
				info!("task #{} '{}' is solved, keeping its files", local.id, local.name);
				actions.push(Action::SkipProtectedTask { id: local.id, name: local.name.clone() });
				actions.push(Action::UpdateMetadataOnly(MetadataUpdate::Task {
					id: incoming.id,
					index: incoming.index,
					description_text: Some(incoming.description_text.clone()),
					update_date: Some(incoming.update_date),
				}));
			} else {
				actions.push(Action::WriteTaskContent { task: incoming.clone() });
			}
		}

		for change in &changes.sections.created {
			actions.push(Action::CreateDirectory {
				parent: change.parent,
				node: Node::Section(change.item.clone()),
			});
		}
		for change in &changes.lessons.created {
			actions.push(Action::CreateDirectory {
				parent: change.parent,
				node: Node::Lesson(change.item.clone()),
			});
		}
		for change in &changes.tasks.created {
			actions.push(Action::CreateDirectory {
				parent: change.parent,
				node: Node::Task(change.item.clone()),
			});
		}

		if let Some(materials) = &changes.additional_materials {
			actions.push(Action::WriteAdditionalFiles(materials.clone()));
		}

		actions
	}

	fn plan_push(&self, changes: &ChangeSet) -> Vec<Action> {
		let mut actions = Vec::new();
		let (sections, lessons, tasks) = (
			changes.sections.deleted.len(),
			changes.lessons.deleted.len(),
			changes.tasks.deleted.len(),
		);
		let deletions = sections + lessons + tasks;
		if deletions > 0 {
			debug!("{} items exist only on the server and are left untouched", deletions);
		}

		if changes.course_info.is_some() {
			actions.push(Action::UploadItem(Upload::CourseInfo));
		}

		for change in &changes.sections.created {
			actions.push(Action::UploadItem(Upload::CreateSection {
				section: change.item.clone(),
			}));
		}
		for change in &changes.sections.info_changed {
			actions.push(Action::UploadItem(Upload::UpdateSection { id: change.key.id() }));
		}

		for change in &changes.lessons.created {
			actions.push(Action::UploadItem(Upload::CreateLesson {
				parent: change.parent,
				lesson: change.item.clone(),
			}));
		}
		for change in &changes.lessons.info_changed {
			actions.push(Action::UploadItem(Upload::UpdateLesson { id: change.key.id() }));
		}

		for change in &changes.tasks.created {
			if let Parent::Lesson(lesson_id) = change.parent {
				actions.push(Action::UploadItem(Upload::CreateTask {
					lesson_id,
					task: change.item.clone(),
				}));
			}
		}
		let mut updated = Vec::new();
		let task_ids = changes
			.tasks
			.info_changed
			.iter()
			.map(|c| c.key.id())
			.chain(changes.content_changed.iter().map(|c| c.new.id));
		for id in task_ids {
			if !updated.contains(&id) {
				updated.push(id);
				actions.push(Action::UploadItem(Upload::UpdateTask { id }));
			}
		}

		actions
	}
}

fn push_info_actions(
	actions: &mut Vec<Action>,
	change: &InfoChange,
	metadata: impl Fn(u64, u32, bool) -> MetadataUpdate,
) {
	if change.renamed() {
		actions.push(Action::RenameDirectory {
			target: change.key,
			new_name: change.new.name.clone(),
		});
	}
	if change.old.index != change.new.index || change.old.visible != change.new.visible {
		actions.push(Action::UpdateMetadataOnly(metadata(
			change.key.id(),
			change.new.index,
			change.new.visible,
		)));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::diff::diff;
	use crate::model::{CheckStatus, Course, TaskFile, TaskKind};
	use chrono::Duration;

	fn course_with_task(text: &str, status: CheckStatus, kind: TaskKind) -> Course {
		let mut task = Task::new("Task", kind);
		task.id = 42;
		task.status = status;
		task.add_file(TaskFile::new("A.kt", text));
		let mut lesson = Lesson::new("Lesson");
		lesson.id = 1;
		lesson.add_task(task);
		let mut course = Course::new(1, "Course");
		course.add_lesson(lesson);
		course
	}

	fn newer(mut course: Course, text: &str) -> Course {
		let task = course.task_mut(42).unwrap();
		task.update_date += Duration::days(1);
		task.status = CheckStatus::Unchecked;
		task.file_mut("A.kt").unwrap().text = text.to_string();
		task.description_text = "new description".to_string();
		course
	}

	#[test]
	fn test_solved_task_gets_metadata_only() {
		let local = course_with_task("X", CheckStatus::Solved, TaskKind::Edu);
		let remote = newer(local.clone(), "Y");
		let plan = Planner::new(Direction::Pull).plan(&diff(&local, None, &remote, Direction::Pull));
		assert!(plan.iter().any(|a| matches!(a, Action::SkipProtectedTask { id: 42, .. })));
		assert!(plan.iter().any(|a| matches!(
			a,
			Action::UpdateMetadataOnly(MetadataUpdate::Task { id: 42, description_text: Some(_), .. })
		)));
		assert!(!plan.iter().any(|a| matches!(a, Action::WriteTaskContent { .. })));
	}

	#[test]
	fn test_solved_theory_task_is_rewritten() {
		let local = course_with_task("X", CheckStatus::Solved, TaskKind::Theory);
		let remote = newer(local.clone(), "Y");
		let plan = Planner::new(Direction::Pull).plan(&diff(&local, None, &remote, Direction::Pull));
		assert!(plan.iter().any(|a| matches!(a, Action::WriteTaskContent { task } if task.id == 42)));
	}

	#[test]
	fn test_protection_can_be_disabled() {
		let local = course_with_task("X", CheckStatus::Solved, TaskKind::Edu);
		let remote = newer(local.clone(), "Y");
		let plan = Planner::new(Direction::Pull)
			.protect_solved(false)
			.plan(&diff(&local, None, &remote, Direction::Pull));
		assert!(plan.iter().any(|a| matches!(a, Action::WriteTaskContent { .. })));
	}

	#[test]
	fn test_pull_orders_deletions_before_creations() {
		let mut local = Course::new(1, "Course");
		let mut old = Lesson::new("Intro");
		old.id = 1;
		local.add_lesson(old);
		let mut remote = Course::new(1, "Course");
		let mut new = Lesson::new("Intro");
		new.id = 2;
		remote.add_lesson(new);

		let plan = Planner::new(Direction::Pull).plan(&diff(&local, None, &remote, Direction::Pull));
		assert_eq!(plan.len(), 2);
		assert!(matches!(plan.actions[0], Action::DeleteDirectory { target: ItemKey::Lesson(1) }));
		assert!(matches!(plan.actions[1], Action::CreateDirectory { .. }));
	}

	#[test]
	fn test_rename_and_move_produce_two_actions() {
		let mut local = Course::new(1, "Course");
		for (id, name) in [(1, "A"), (2, "B")] {
			let mut l = Lesson::new(name);
			l.id = id;
			local.add_lesson(l);
		}
		let mut remote = Course::new(1, "Course");
		for (id, name) in [(2, "B"), (1, "Renamed")] {
			let mut l = Lesson::new(name);
			l.id = id;
			remote.add_lesson(l);
		}
		let plan = Planner::new(Direction::Pull).plan(&diff(&local, None, &remote, Direction::Pull));
		assert!(plan.iter().any(|a| matches!(
			a,
			Action::RenameDirectory { target: ItemKey::Lesson(1), new_name } if new_name == "Renamed"
		)));
		assert!(plan.iter().any(|a| matches!(
			a,
			Action::UpdateMetadataOnly(MetadataUpdate::Lesson { id: 1, index: 2, .. })
		)));
	}

	#[test]
	fn test_push_never_deletes() {
		let remote = course_with_task("X", CheckStatus::Unchecked, TaskKind::Edu);
		let local = Course::new(1, "Course");
		let plan = Planner::new(Direction::Push).plan(&diff(&local, None, &remote, Direction::Push));
		assert!(plan.is_empty());
	}

	#[test]
	fn test_push_updates_task_once() {
		let remote = course_with_task("X", CheckStatus::Unchecked, TaskKind::Edu);
		let mut local = remote.clone();
		let task = local.task_mut(42).unwrap();
		task.name = "Renamed".to_string();
		task.file_mut("A.kt").unwrap().text = "changed".to_string();
		let plan = Planner::new(Direction::Push).plan(&diff(&local, None, &remote, Direction::Push));
		assert_eq!(plan.actions, vec![Action::UploadItem(Upload::UpdateTask { id: 42 })]);
	}
}

// vim: ts=4
