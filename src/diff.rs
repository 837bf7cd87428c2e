//! Keyed three-way diff of course snapshots
//!
//! The differ compares a *target* tree (the side being changed) against a
//! *source* tree (the side being adopted). Items are matched by id within
//! their container. An id the source has but the target lacks is created,
//! unless the base snapshot knew it, in which case the target removed it on
//! purpose and it is left alone. A target item whose id is missing from the
//! source container is deleted. Items without an id are always created.
//!
//! A lesson or task that moved to another container shows up as deleted in
//! the old one and created in the new one.
//!
//! Children of created and deleted items travel with their parent and are
//! not listed separately.
//!
//! Indices are compared in the target's numbering. Local-only items of a
//! target container keep their positions and the surviving source items fill
//! the remaining ones in source order.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::model::{Course, CourseItem, ItemInfo, ItemKey, Lesson, Parent, Section, StudyItem, Task};
use crate::strategies::Direction;

/// An item created or deleted under `parent`
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
	pub parent: Parent,
	pub item: T,
}

/// An item matched by id whose name, index or visibility differs
#[derive(Debug, Clone, PartialEq)]
pub struct InfoChange {
	pub key: ItemKey,
	/// Container on the target side
	pub parent: Parent,
	pub old: ItemInfo,
	pub new: ItemInfo,
}

impl InfoChange {
	pub fn renamed(&self) -> bool {
		self.old.name != self.new.name
	}
}

/// A task matched by id whose authored content differs
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
	pub parent: Parent,
	/// Target side
	pub old: Task,
	/// Source side
	pub new: Task,
}

/// Changes found at one level of the hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChanges<T> {
	pub created: Vec<Change<T>>,
	pub deleted: Vec<Change<T>>,
	pub info_changed: Vec<InfoChange>,
}

impl<T> Default for LevelChanges<T> {
	fn default() -> Self {
		LevelChanges { created: Vec::new(), deleted: Vec::new(), info_changed: Vec::new() }
	}
}

impl<T> LevelChanges<T> {
	pub fn is_empty(&self) -> bool {
		self.created.is_empty() && self.deleted.is_empty() && self.info_changed.is_empty()
	}

	/// Created, deleted and info-changed counts
	pub fn counts(&self) -> (usize, usize, usize) {
		(self.created.len(), self.deleted.len(), self.info_changed.len())
	}
}

/// Course-level metadata compared by the differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseInfo {
	pub name: String,
	pub description: String,
	pub human_language: String,
	pub language_id: String,
}

impl From<&Course> for CourseInfo {
	fn from(course: &Course) -> Self {
		CourseInfo {
			name: course.name.clone(),
			description: course.description.clone(),
			human_language: course.human_language.clone(),
			language_id: course.language_id.clone(),
		}
	}
}

/// Course-wide files newer on the source side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalMaterials {
	pub files: BTreeMap<String, String>,
	pub update_date: DateTime<Utc>,
}

/// Structural delta between two course snapshots
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
	/// New course metadata when it differs
	pub course_info: Option<CourseInfo>,
	/// Set on pull when the server's course-wide files are newer
	pub additional_materials: Option<AdditionalMaterials>,
	pub sections: LevelChanges<Section>,
	pub lessons: LevelChanges<Lesson>,
	pub tasks: LevelChanges<Task>,
	pub content_changed: Vec<ContentChange>,

	/// Lessons holding a created, deleted or content-changed task
	pub changed_lessons: BTreeSet<u64>,
	/// Sections holding a created, deleted or changed lesson
	pub changed_sections: BTreeSet<u64>,
	pub course_content_changed: bool,
}

impl ChangeSet {
	pub fn course_info_changed(&self) -> bool {
		self.course_info.is_some()
	}

	pub fn is_empty(&self) -> bool {
		self.course_info.is_none()
			&& self.additional_materials.is_none()
			&& self.sections.is_empty()
			&& self.lessons.is_empty()
			&& self.tasks.is_empty()
			&& self.content_changed.is_empty()
	}
}

impl fmt::Display for ChangeSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_empty() {
			return write!(f, "no changes");
		}
		if self.course_info_changed() {
			writeln!(f, "course info changed")?;
		}
		if let Some(materials) = &self.additional_materials {
			writeln!(f, "additional files: {}", materials.files.len())?;
		}
		for (label, (created, deleted, info)) in [
			("sections", self.sections.counts()),
			("lessons", self.lessons.counts()),
			("tasks", self.tasks.counts()),
		] {
			if created + deleted + info > 0 {
				writeln!(
					f,
					"{}: {} created, {} deleted, {} info changed",
					label, created, deleted, info
				)?;
			}
		}
		write!(f, "tasks with new content: {}", self.content_changed.len())
	}
}

/// Diff the local tree against a server snapshot
///
/// For [`Direction::Pull`] the local tree is the target and `baseline` (the
/// last snapshot adopted, `None` if never synced) decides which server items
/// the learner removed locally. Content changes require the server copy to be
/// strictly newer.
///
/// For [`Direction::Push`] the server snapshot is the target, the local tree
/// is adopted and `baseline` is not consulted.
pub fn diff(
	local: &Course,
	baseline: Option<&Course>,
	remote: &Course,
	direction: Direction,
) -> ChangeSet {
	match direction {
		Direction::Pull => diff_trees(local, baseline.unwrap_or(local), remote, true),
		Direction::Push => diff_trees(remote, remote, local, false),
	}
}

/// Core keyed diff: what it takes to turn `target` into `source`
pub fn diff_trees(
	target: &Course,
	base: &Course,
	source: &Course,
	require_newer: bool,
) -> ChangeSet {
	let mut differ = Differ {
		target,
		source,
		base: collect_keys(base),
		require_newer,
		changes: ChangeSet::default(),
	};
	differ.course_info();
	differ.top_level();
	differ.propagate();
	differ.changes
}

fn collect_keys(course: &Course) -> HashSet<ItemKey> {
	let mut keys = HashSet::new();
	for section in course.sections() {
		keys.insert(ItemKey::Section(section.id));
	}
	for lesson in course.all_lessons() {
		keys.insert(ItemKey::Lesson(lesson.id));
		for task in &lesson.tasks {
			keys.insert(ItemKey::Task(task.id));
		}
	}
	keys.remove(&ItemKey::Section(0));
	keys.remove(&ItemKey::Lesson(0));
	keys.remove(&ItemKey::Task(0));
	keys
}

/// Outcome of matching one container's children
struct Matching<'a, T> {
	created: Vec<&'a T>,
	deleted: Vec<&'a T>,
	pairs: Vec<(&'a T, &'a T)>,
}

/// Match children of one container by id
///
/// `skip` tells whether an unmatched source id was removed on the target side
/// on purpose.
fn match_children<'a, T: StudyItem>(
	target: &[&'a T],
	source: &[&'a T],
	skip: impl Fn(u64) -> bool,
) -> Matching<'a, T> {
	let mut result = Matching { created: Vec::new(), deleted: Vec::new(), pairs: Vec::new() };
	for s in source {
		if s.id() == 0 {
			result.created.push(*s);
		} else if let Some(t) = target.iter().find(|t| t.id() == s.id()) {
			result.pairs.push((*t, *s));
		} else if !skip(s.id()) {
			result.created.push(*s);
		}
	}
	for t in target {
		if t.id() != 0 && !source.iter().any(|s| s.id() == t.id()) {
			result.deleted.push(*t);
		}
	}
	result
}

/// Final 1-based positions of surviving source items in a target container
///
/// `target` lists the container's keys in order. A local-only item (id 0)
/// keeps its position among the target items that stay. Surviving source
/// items take the free positions in source order. Source items without an id
/// count but are not listed.
fn positions(
	target: &[ItemKey],
	source: &[ItemKey],
	survives: impl Fn(ItemKey) -> bool,
) -> HashMap<ItemKey, u32> {
	let mut taken = HashSet::new();
	let mut staying = 0u32;
	for key in target {
		if key.id() == 0 {
			staying += 1;
			taken.insert(staying);
		} else if source.contains(key) {
			staying += 1;
		}
	}
	let survivors: Vec<ItemKey> = source.iter().copied().filter(|key| survives(*key)).collect();
	let free = (1..).filter(|p| !taken.contains(p));

	survivors.into_iter().zip(free).filter(|(key, _)| key.id() != 0).collect()
}

fn keys<T: StudyItem>(items: &[&T], key: fn(u64) -> ItemKey) -> Vec<ItemKey> {
	items.iter().map(|item| key(item.id())).collect()
}

/// Copy of a created item renumbered to its position in the target container
fn placed<T: StudyItem + Clone>(item: &T, key: ItemKey, positions: &HashMap<ItemKey, u32>) -> T {
	let mut item = item.clone();
	if let Some(position) = positions.get(&key) {
		item.set_index(*position);
	}
	item
}

struct Differ<'a> {
	target: &'a Course,
	source: &'a Course,
	base: HashSet<ItemKey>,
	require_newer: bool,
	changes: ChangeSet,
}

impl<'a> Differ<'a> {
	/// Known to the base but gone from the target tree
	fn removed_on_target(&self, key: ItemKey) -> bool {
		self.base.contains(&key) && !self.target.contains(key)
	}

	fn matching<'b, T: StudyItem>(
		&self,
		target: &[&'b T],
		source: &[&'b T],
		key: fn(u64) -> ItemKey,
	) -> Matching<'b, T> {
		match_children(target, source, |id| self.removed_on_target(key(id)))
	}

	/// Positions `source` children take once applied to the `target` container
	fn positions(&self, target: &[ItemKey], source: &[ItemKey]) -> HashMap<ItemKey, u32> {
		positions(target, source, |key| {
			key.id() == 0 || target.contains(&key) || !self.removed_on_target(key)
		})
	}

	/// `new` carries the position the item takes in the target container
	fn info_change<T: StudyItem>(
		&self,
		key: ItemKey,
		parent: Parent,
		(old, new): (&T, &T),
		positions: &HashMap<ItemKey, u32>,
	) -> Option<InfoChange> {
		let (old, mut new) = (old.info(), new.info());
		if let Some(position) = positions.get(&key) {
			new.index = *position;
		}
		if old.name != new.name || old.index != new.index || old.visible != new.visible {
			Some(InfoChange { key, parent, old, new })
		} else {
			None
		}
	}

	fn course_info(&mut self) {
		let old = CourseInfo::from(self.target);
		let new = CourseInfo::from(self.source);
		if old != new {
			self.changes.course_info = Some(new);
		}
	}

	/// Only pulls adopt course-wide files, and only when the source copy is
	/// more than a second newer
	fn additional_materials(&mut self) {
		let newer = self.source.additional_materials_update_date
			> self.target.additional_materials_update_date + Duration::seconds(1);
		if self.require_newer && newer && !self.source.additional_files.is_empty() {
			self.changes.additional_materials = Some(AdditionalMaterials {
				files: self.source.additional_files.clone(),
				update_date: self.source.additional_materials_update_date,
			});
		}
	}

	fn top_level(&mut self) {
		// sections and top-level lessons share one numbering
		let target: Vec<ItemKey> = self.target.items.iter().map(CourseItem::key).collect();
		let source: Vec<ItemKey> = self.source.items.iter().map(CourseItem::key).collect();
		let top = self.positions(&target, &source);

		let target: Vec<&Section> = self.target.sections().collect();
		let source: Vec<&Section> = self.source.sections().collect();
		let matching = self.matching(&target, &source, ItemKey::Section);

		let parent = Parent::Course;
		for section in matching.created {
			let item = placed(section, ItemKey::Section(section.id), &top);
			self.changes.sections.created.push(Change { parent, item });
		}
		for section in matching.deleted {
			self.changes.sections.deleted.push(Change { parent, item: section.clone() });
		}
		for (old, new) in matching.pairs {
			let key = ItemKey::Section(old.id);
			if let Some(change) = self.info_change(key, parent, (old, new), &top) {
				self.changes.sections.info_changed.push(change);
			}
			let target: Vec<&Lesson> = old.lessons.iter().collect();
			let source: Vec<&Lesson> = new.lessons.iter().collect();
			let inner =
				self.positions(&keys(&target, ItemKey::Lesson), &keys(&source, ItemKey::Lesson));
			self.lessons(Parent::Section(old.id), &target, &source, &inner);
		}

		let target: Vec<&Lesson> = self.target.lessons().collect();
		let source: Vec<&Lesson> = self.source.lessons().collect();
		self.lessons(parent, &target, &source, &top);
	}

	fn lessons(
		&mut self,
		parent: Parent,
		target: &[&Lesson],
		source: &[&Lesson],
		positions: &HashMap<ItemKey, u32>,
	) {
		let matching = self.matching(target, source, ItemKey::Lesson);

		for lesson in matching.created {
			let item = placed(lesson, ItemKey::Lesson(lesson.id), positions);
			self.changes.lessons.created.push(Change { parent, item });
		}
		for lesson in matching.deleted {
			self.changes.lessons.deleted.push(Change { parent, item: lesson.clone() });
		}
		for (old, new) in matching.pairs {
			let key = ItemKey::Lesson(old.id);
			if let Some(change) = self.info_change(key, parent, (old, new), positions) {
				self.changes.lessons.info_changed.push(change);
			}
			self.tasks(old.id, &old.tasks, &new.tasks);
		}
	}

	fn tasks(&mut self, lesson_id: u64, target: &[Task], source: &[Task]) {
		let parent = Parent::Lesson(lesson_id);
		let target: Vec<&Task> = target.iter().collect();
		let source: Vec<&Task> = source.iter().collect();
		let positions =
			self.positions(&keys(&target, ItemKey::Task), &keys(&source, ItemKey::Task));
		let matching = self.matching(&target, &source, ItemKey::Task);

		for task in matching.created {
			let item = placed(task, ItemKey::Task(task.id), &positions);
			self.changes.tasks.created.push(Change { parent, item });
		}
		for task in matching.deleted {
			self.changes.tasks.deleted.push(Change { parent, item: task.clone() });
		}
		for (old, new) in matching.pairs {
			let key = ItemKey::Task(old.id);
			if let Some(change) = self.info_change(key, parent, (old, new), &positions) {
				self.changes.tasks.info_changed.push(change);
			}
			let newer = !self.require_newer || new.update_date > old.update_date;
			if newer && !old.content_eq(new) {
				self.changes.content_changed.push(ContentChange {
					parent,
					old: old.clone(),
					new: placed(new, key, &positions),
				});
			}
		}
	}

	/// Mark every ancestor of a structural or content change
	fn propagate(&mut self) {
		let mut lessons = BTreeSet::new();
		let task_parents = self
			.changes
			.tasks
			.created
			.iter()
			.map(|c| c.parent)
			.chain(self.changes.tasks.deleted.iter().map(|c| c.parent))
			.chain(self.changes.content_changed.iter().map(|c| c.parent));
		for parent in task_parents {
			if let Parent::Lesson(id) = parent {
				lessons.insert(id);
			}
		}

		let mut sections = BTreeSet::new();
		let lesson_parents = self
			.changes
			.lessons
			.created
			.iter()
			.map(|c| c.parent)
			.chain(self.changes.lessons.deleted.iter().map(|c| c.parent))
			.chain(lessons.iter().filter_map(|id| self.target.parent_of(ItemKey::Lesson(*id))));
		for parent in lesson_parents {
			if let Parent::Section(id) = parent {
				sections.insert(id);
			}
		}

		self.changes.course_content_changed = !lessons.is_empty()
			|| !sections.is_empty()
			|| !self.changes.sections.created.is_empty()
			|| !self.changes.sections.deleted.is_empty()
			|| !self.changes.lessons.created.is_empty()
			|| !self.changes.lessons.deleted.is_empty();
		self.changes.changed_lessons = lessons;
		self.changes.changed_sections = sections;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{TaskFile, TaskKind};
	use chrono::{Duration, TimeZone, Utc};

	fn task(id: u64, name: &str, text: &str) -> Task {
		let mut t = Task::new(name, TaskKind::Edu);
		t.id = id;
		t.update_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
		t.add_file(TaskFile::new("Main.kt", text));
		t
	}

	fn lesson(id: u64, name: &str, tasks: Vec<Task>) -> Lesson {
		let mut l = Lesson::new(name);
		l.id = id;
		for t in tasks {
			l.add_task(t);
		}
		l
	}

	fn course(lessons: Vec<Lesson>) -> Course {
		let mut c = Course::new(1, "Course");
		for l in lessons {
			c.add_lesson(l);
		}
		c
	}

	#[test]
	fn test_identical_trees_have_no_changes() {
		let c = course(vec![lesson(1, "L1", vec![task(10, "T", "x")])]);
		let changes = diff(&c, Some(&c), &c, Direction::Pull);
		assert!(changes.is_empty());
		assert!(!changes.course_content_changed);
	}

	#[test]
	fn test_rename_is_info_change_not_create_delete() {
		let local = course(vec![lesson(5, "Intro", vec![])]);
		let remote = course(vec![lesson(5, "Basics", vec![])]);
		let changes = diff(&local, None, &remote, Direction::Pull);
		assert!(changes.lessons.created.is_empty());
		assert!(changes.lessons.deleted.is_empty());
		assert_eq!(changes.lessons.info_changed.len(), 1);
		assert!(changes.lessons.info_changed[0].renamed());
	}

	#[test]
	fn test_content_change_requires_newer_remote() {
		let local = course(vec![lesson(1, "L", vec![task(10, "T", "old")])]);
		let mut remote = course(vec![lesson(1, "L", vec![task(10, "T", "new")])]);

		let changes = diff(&local, None, &remote, Direction::Pull);
		assert!(changes.content_changed.is_empty());

		remote.task_mut(10).unwrap().update_date += Duration::hours(1);
		let changes = diff(&local, None, &remote, Direction::Pull);
		assert_eq!(changes.content_changed.len(), 1);
		assert!(changes.changed_lessons.contains(&1));
		assert!(changes.course_content_changed);
	}

	#[test]
	fn test_newer_but_equal_content_is_not_a_change() {
		let local = course(vec![lesson(1, "L", vec![task(10, "T", "same")])]);
		let mut remote = local.clone();
		remote.task_mut(10).unwrap().update_date += Duration::days(3);
		assert!(diff(&local, None, &remote, Direction::Pull).content_changed.is_empty());
	}

	#[test]
	fn test_baseline_hides_items_deleted_locally() {
		let baseline = course(vec![lesson(1, "L1", vec![]), lesson(2, "L2", vec![])]);
		let local = course(vec![lesson(1, "L1", vec![])]);
		let remote = baseline.clone();
		let changes = diff(&local, Some(&baseline), &remote, Direction::Pull);
		assert!(changes.lessons.created.is_empty());

		let changes = diff(&local, None, &remote, Direction::Pull);
		assert_eq!(changes.lessons.created.len(), 1);
	}

	#[test]
	fn test_local_only_items_are_not_deleted_by_pull() {
		let mut local = course(vec![lesson(1, "L1", vec![])]);
		local.add_lesson(Lesson::new("Draft"));
		let remote = course(vec![lesson(1, "L1", vec![])]);
		let changes = diff(&local, None, &remote, Direction::Pull);
		assert!(changes.lessons.deleted.is_empty());
	}

	#[test]
	fn test_push_creates_items_without_id() {
		let remote = course(vec![lesson(1, "L1", vec![task(10, "T", "x")])]);
		let mut local = remote.clone();
		local.lesson_mut(1).unwrap().add_task(Task::new("New", TaskKind::Theory));
		local.add_lesson(Lesson::new("Fresh"));
		let changes = diff(&local, None, &remote, Direction::Push);
		assert_eq!(changes.tasks.created.len(), 1);
		assert_eq!(changes.tasks.created[0].parent, Parent::Lesson(1));
		assert_eq!(changes.lessons.created.len(), 1);
		assert_eq!(changes.lessons.created[0].item.name, "Fresh");
	}

	#[test]
	fn test_push_content_change_ignores_dates() {
		let remote = course(vec![lesson(1, "L1", vec![task(10, "T", "server")])]);
		let mut local = remote.clone();
		local.task_mut(10).unwrap().description_text = "edited".to_string();
		let changes = diff(&local, None, &remote, Direction::Push);
		assert_eq!(changes.content_changed.len(), 1);
		assert_eq!(changes.content_changed[0].new.description_text, "edited");
	}

	#[test]
	fn test_moved_lesson_is_delete_plus_create() {
		let mut local = course(vec![lesson(7, "Moving", vec![])]);
		let mut section = Section::new("S");
		section.id = 3;
		local.add_section(section.clone());

		let mut remote = Course::new(1, "Course");
		section.add_lesson(lesson(7, "Moving", vec![]));
		remote.add_section(section);

		let changes = diff(&local, None, &remote, Direction::Pull);
		assert_eq!(changes.lessons.deleted.len(), 1);
		assert_eq!(changes.lessons.deleted[0].parent, Parent::Course);
		assert_eq!(changes.lessons.created.len(), 1);
		assert_eq!(changes.lessons.created[0].parent, Parent::Section(3));
		assert!(changes.changed_sections.contains(&3));
	}

	#[test]
	fn test_children_of_created_lesson_are_not_listed() {
		let local = course(vec![]);
		let remote = course(vec![lesson(2, "L2", vec![task(20, "T", "x")])]);
		let changes = diff(&local, None, &remote, Direction::Pull);
		assert_eq!(changes.lessons.created.len(), 1);
		assert!(changes.tasks.created.is_empty());
	}

	#[test]
	fn test_local_only_items_do_not_shift_positions() {
		let local = course(vec![
			lesson(1, "L1", vec![task(10, "A", "a"), task(0, "Note", "n"), task(11, "B", "b")]),
			lesson(0, "Draft", vec![]),
			lesson(2, "L2", vec![]),
		]);
		let remote = course(vec![
			lesson(1, "L1", vec![task(10, "A", "a"), task(11, "B", "b")]),
			lesson(2, "L2", vec![]),
		]);
		let changes = diff(&local, Some(&remote), &remote, Direction::Pull);
		assert!(changes.is_empty(), "{}", changes);
	}

	#[test]
	fn test_positions_skip_deleted_target_items() {
		let target = [1, 2, 0, 3].map(ItemKey::Lesson);
		let source = [3, 4, 1].map(ItemKey::Lesson);
		let placed = positions(&target, &source, |_| true);
		// the local-only lesson stays second once lesson 2 is gone
		assert_eq!(placed[&ItemKey::Lesson(3)], 1);
		assert_eq!(placed[&ItemKey::Lesson(4)], 3);
		assert_eq!(placed[&ItemKey::Lesson(1)], 4);
		assert_eq!(placed.len(), 3);
	}

	#[test]
	fn test_course_info_change() {
		let local = course(vec![]);
		let mut remote = local.clone();
		remote.description = "Learn Kotlin".to_string();
		let changes = diff(&local, None, &remote, Direction::Pull);
		let info = changes.course_info.as_ref().map(|i| i.description.as_str());
		assert_eq!(info, Some("Learn Kotlin"));
	}
}

// vim: ts=4
