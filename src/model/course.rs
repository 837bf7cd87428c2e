//! Course, sections and lessons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::task::epoch;
use super::{
	insert_ordered, normalize_order, reindex, AnswerPlaceholder, AnswerPlaceholderDependency,
	ItemKey, Node, Parent, StudyItem, Task,
};
use crate::error::SyncError;

/// Names the server gives the lesson carrying course-wide files
pub const ADDITIONAL_MATERIALS: &[&str] =
	&["Edu additional materials", "PyCharm additional materials"];

fn default_true() -> bool {
	true
}

/// An ordered list of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
	#[serde(default)]
	pub id: u64,
	pub name: String,
	#[serde(default)]
	pub index: u32,
	#[serde(default = "epoch")]
	pub update_date: DateTime<Utc>,
	#[serde(default = "default_true")]
	pub is_public: bool,
	/// Tasks share one file set across steps
	#[serde(default)]
	pub framework: bool,
	/// Owning section, `None` for top-level lessons
	#[serde(default)]
	pub section_id: Option<u64>,
	/// Server-side unit linking the lesson to its section
	#[serde(default)]
	pub unit_id: Option<u64>,
	#[serde(default)]
	pub tasks: Vec<Task>,
}

impl Lesson {
	pub fn new(name: &str) -> Self {
		Lesson {
			id: 0,
			name: name.to_string(),
			index: 0,
			update_date: epoch(),
			is_public: true,
			framework: false,
			section_id: None,
			unit_id: None,
			tasks: Vec::new(),
		}
	}

	/// Append a task at the end
	pub fn add_task(&mut self, mut task: Task) {
		task.index = self.tasks.len() as u32 + 1;
		task.lesson_id = self.id;
		self.tasks.push(task);
	}

	pub fn task(&self, id: u64) -> Option<&Task> {
		self.tasks.iter().find(|t| id != 0 && t.id == id)
	}

	pub fn task_named(&self, name: &str) -> Option<&Task> {
		self.tasks.iter().find(|t| t.name == name)
	}

	fn adopt_children(&mut self) {
		for task in &mut self.tasks {
			task.lesson_id = self.id;
		}
	}
}

impl StudyItem for Lesson {
	fn id(&self) -> u64 {
		self.id
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn index(&self) -> u32 {
		self.index
	}

	fn set_index(&mut self, index: u32) {
		self.index = index;
	}

	fn update_date(&self) -> DateTime<Utc> {
		self.update_date
	}

	fn is_visible(&self) -> bool {
		self.is_public
	}
}

/// A named group of lessons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
	#[serde(default)]
	pub id: u64,
	pub name: String,
	#[serde(default)]
	pub index: u32,
	#[serde(default = "epoch")]
	pub update_date: DateTime<Utc>,
	#[serde(default)]
	pub lessons: Vec<Lesson>,
}

impl Section {
	pub fn new(name: &str) -> Self {
		Section {
			id: 0,
			name: name.to_string(),
			index: 0,
			update_date: epoch(),
			lessons: Vec::new(),
		}
	}

	/// Append a lesson at the end
	pub fn add_lesson(&mut self, mut lesson: Lesson) {
		lesson.index = self.lessons.len() as u32 + 1;
		lesson.section_id = Some(self.id);
		lesson.adopt_children();
		self.lessons.push(lesson);
	}

	pub fn lesson(&self, id: u64) -> Option<&Lesson> {
		self.lessons.iter().find(|l| id != 0 && l.id == id)
	}

	fn adopt_children(&mut self) {
		for lesson in &mut self.lessons {
			lesson.section_id = Some(self.id);
			lesson.adopt_children();
		}
	}
}

impl StudyItem for Section {
	fn id(&self) -> u64 {
		self.id
	}

	fn name(&self) -> &str {
		&self.name
	}

	fn index(&self) -> u32 {
		self.index
	}

	fn set_index(&mut self, index: u32) {
		self.index = index;
	}

	fn update_date(&self) -> DateTime<Utc> {
		self.update_date
	}
}

/// Top-level entry of a course: sections and lessons share one ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CourseItem {
	Section(Section),
	Lesson(Lesson),
}

impl CourseItem {
	fn set_name(&mut self, name: &str) {
		match self {
			CourseItem::Section(s) => s.name = name.to_string(),
			CourseItem::Lesson(l) => l.name = name.to_string(),
		}
	}

	pub fn key(&self) -> ItemKey {
		match self {
			CourseItem::Section(s) => ItemKey::Section(s.id),
			CourseItem::Lesson(l) => ItemKey::Lesson(l.id),
		}
	}
}

impl StudyItem for CourseItem {
	fn id(&self) -> u64 {
		match self {
			CourseItem::Section(s) => s.id,
			CourseItem::Lesson(l) => l.id,
		}
	}

	fn name(&self) -> &str {
		match self {
			CourseItem::Section(s) => &s.name,
			CourseItem::Lesson(l) => &l.name,
		}
	}

	fn index(&self) -> u32 {
		match self {
			CourseItem::Section(s) => s.index,
			CourseItem::Lesson(l) => l.index,
		}
	}

	fn set_index(&mut self, index: u32) {
		match self {
			CourseItem::Section(s) => s.index = index,
			CourseItem::Lesson(l) => l.index = index,
		}
	}

	fn update_date(&self) -> DateTime<Utc> {
		match self {
			CourseItem::Section(s) => s.update_date,
			CourseItem::Lesson(l) => l.update_date,
		}
	}

	fn is_visible(&self) -> bool {
		match self {
			CourseItem::Section(s) => s.is_visible(),
			CourseItem::Lesson(l) => l.is_visible(),
		}
	}
}

/// Root of the course tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
	#[serde(default)]
	pub id: u64,
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub human_language: String,
	#[serde(default)]
	pub language_id: String,
	#[serde(default = "epoch")]
	pub update_date: DateTime<Utc>,
	/// Server-side section hosting the top-level lessons
	#[serde(default)]
	pub lessons_section_id: Option<u64>,
	#[serde(default)]
	pub items: Vec<CourseItem>,
	/// Course-wide files written at the course root, by relative path
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub additional_files: BTreeMap<String, String>,
	#[serde(default = "epoch")]
	pub additional_materials_update_date: DateTime<Utc>,
}

impl Course {
	pub fn new(id: u64, name: &str) -> Self {
		Course {
			id,
			name: name.to_string(),
			description: String::new(),
			human_language: String::new(),
			language_id: String::new(),
			update_date: epoch(),
			lessons_section_id: None,
			items: Vec::new(),
			additional_files: BTreeMap::new(),
			additional_materials_update_date: epoch(),
		}
	}

	/// Turn the server's additional-materials lesson into course-wide files
	///
	/// Files and additional files of every task of that lesson are merged by
	/// path. The lesson leaves the tree and its update date becomes
	/// `additional_materials_update_date`.
	pub fn lift_additional_materials(&mut self) -> bool {
		let pos = self.items.iter().position(|item| {
			matches!(item, CourseItem::Lesson(l) if ADDITIONAL_MATERIALS.contains(&l.name.as_str()))
		});
		let Some(CourseItem::Lesson(lesson)) = pos.map(|pos| self.items.remove(pos)) else {
			return false;
		};
		reindex(&mut self.items);

		for task in &lesson.tasks {
			for file in &task.files {
				self.additional_files.insert(file.name.clone(), file.text.clone());
			}
			for (name, text) in &task.additional_files {
				self.additional_files.insert(name.clone(), text.clone());
			}
		}
		self.additional_materials_update_date = lesson.update_date;
		true
	}

	/// Append a section at the end of the course
	pub fn add_section(&mut self, mut section: Section) {
		section.index = self.items.len() as u32 + 1;
		section.adopt_children();
		self.items.push(CourseItem::Section(section));
	}

	/// Append a top-level lesson at the end of the course
	pub fn add_lesson(&mut self, mut lesson: Lesson) {
		lesson.index = self.items.len() as u32 + 1;
		lesson.section_id = None;
		lesson.adopt_children();
		self.items.push(CourseItem::Lesson(lesson));
	}

	pub fn sections(&self) -> impl Iterator<Item = &Section> {
		self.items.iter().filter_map(|item| match item {
			CourseItem::Section(s) => Some(s),
			CourseItem::Lesson(_) => None,
		})
	}

	/// Top-level lessons only
	pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
		self.items.iter().filter_map(|item| match item {
			CourseItem::Lesson(l) => Some(l),
			CourseItem::Section(_) => None,
		})
	}

	/// Top-level lessons plus lessons nested in sections, in display order
	pub fn all_lessons(&self) -> Vec<&Lesson> {
		let mut out = Vec::new();
		for item in &self.items {
			match item {
				CourseItem::Lesson(l) => out.push(l),
				CourseItem::Section(s) => out.extend(s.lessons.iter()),
			}
		}
		out
	}

	pub fn all_tasks(&self) -> Vec<&Task> {
		self.all_lessons().into_iter().flat_map(|l| l.tasks.iter()).collect()
	}

	fn all_lessons_mut(&mut self) -> Vec<&mut Lesson> {
		let mut out = Vec::new();
		for item in &mut self.items {
			match item {
				CourseItem::Lesson(l) => out.push(l),
				CourseItem::Section(s) => out.extend(s.lessons.iter_mut()),
			}
		}
		out
	}

	pub fn section(&self, id: u64) -> Option<&Section> {
		self.sections().find(|s| id != 0 && s.id == id)
	}

	pub fn section_mut(&mut self, id: u64) -> Option<&mut Section> {
		self.items.iter_mut().find_map(|item| match item {
			CourseItem::Section(s) if id != 0 && s.id == id => Some(s),
			_ => None,
		})
	}

	pub fn lesson(&self, id: u64) -> Option<&Lesson> {
		self.all_lessons().into_iter().find(|l| id != 0 && l.id == id)
	}

	pub fn lesson_mut(&mut self, id: u64) -> Option<&mut Lesson> {
		self.all_lessons_mut().into_iter().find(|l| id != 0 && l.id == id)
	}

	pub fn task(&self, id: u64) -> Option<&Task> {
		self.all_tasks().into_iter().find(|t| id != 0 && t.id == id)
	}

	pub fn task_mut(&mut self, id: u64) -> Option<&mut Task> {
		self.all_lessons_mut()
			.into_iter()
			.flat_map(|l| l.tasks.iter_mut())
			.find(|t| id != 0 && t.id == id)
	}

	/// The lesson holding a task
	pub fn lesson_of_task(&self, task_id: u64) -> Option<&Lesson> {
		self.all_lessons().into_iter().find(|l| l.task(task_id).is_some())
	}

	pub fn contains(&self, key: ItemKey) -> bool {
		match key {
			ItemKey::Section(id) => self.section(id).is_some(),
			ItemKey::Lesson(id) => self.lesson(id).is_some(),
			ItemKey::Task(id) => self.task(id).is_some(),
		}
	}

	/// Container of an item, found by scanning rather than trusting back-references
	pub fn parent_of(&self, key: ItemKey) -> Option<Parent> {
		match key {
			ItemKey::Section(id) => self.section(id).map(|_| Parent::Course),
			ItemKey::Lesson(id) => {
				if self.lessons().any(|l| id != 0 && l.id == id) {
					return Some(Parent::Course);
				}
				self.sections().find(|s| s.lesson(id).is_some()).map(|s| Parent::Section(s.id))
			}
			ItemKey::Task(id) => self.lesson_of_task(id).map(|l| Parent::Lesson(l.id)),
		}
	}

	pub fn item_name(&self, key: ItemKey) -> Option<&str> {
		match key {
			ItemKey::Section(id) => self.section(id).map(|s| s.name.as_str()),
			ItemKey::Lesson(id) => self.lesson(id).map(|l| l.name.as_str()),
			ItemKey::Task(id) => self.task(id).map(|t| t.name.as_str()),
		}
	}

	/// Directory of a container relative to the course root
	pub fn container_path(&self, parent: Parent) -> Option<PathBuf> {
		match parent {
			Parent::Course => Some(PathBuf::new()),
			Parent::Section(id) => self.path_of(ItemKey::Section(id)),
			Parent::Lesson(id) => self.path_of(ItemKey::Lesson(id)),
		}
	}

	/// Directory of an item relative to the course root
	pub fn path_of(&self, key: ItemKey) -> Option<PathBuf> {
		let parent = self.parent_of(key)?;
		let name = self.item_name(key)?;
		Some(self.container_path(parent)?.join(name))
	}

	/// Whether a child of `parent` already carries `name`
	pub fn child_named(&self, parent: Parent, name: &str) -> bool {
		match parent {
			Parent::Course => self.items.iter().any(|i| i.name() == name),
			Parent::Section(id) => {
				self.section(id).map_or(false, |s| s.lessons.iter().any(|l| l.name == name))
			}
			Parent::Lesson(id) => {
				self.lesson(id).map_or(false, |l| l.tasks.iter().any(|t| t.name == name))
			}
		}
	}

	/// Rename whichever child of `parent` is called `old`, with or without an id
	pub fn rename_child(&mut self, parent: Parent, old: &str, new: &str) -> bool {
		match parent {
			Parent::Course => {
				if let Some(item) = self.items.iter_mut().find(|i| i.name() == old) {
					item.set_name(new);
					return true;
				}
			}
			Parent::Section(id) => {
				if let Some(lesson) =
					self.section_mut(id).and_then(|s| s.lessons.iter_mut().find(|l| l.name == old))
				{
					lesson.name = new.to_string();
					return true;
				}
			}
			Parent::Lesson(id) => {
				if let Some(task) =
					self.lesson_mut(id).and_then(|l| l.tasks.iter_mut().find(|t| t.name == old))
				{
					task.name = new.to_string();
					return true;
				}
			}
		}
		false
	}

	pub fn rename(&mut self, key: ItemKey, name: &str) -> bool {
		match key {
			ItemKey::Section(id) => self.section_mut(id).map(|s| s.name = name.to_string()),
			ItemKey::Lesson(id) => self.lesson_mut(id).map(|l| l.name = name.to_string()),
			ItemKey::Task(id) => self.task_mut(id).map(|t| t.name = name.to_string()),
		}
		.is_some()
	}

	/// Insert a subtree under `parent` at the position named by its index
	///
	/// Siblings are renumbered to 1..N afterwards.
	pub fn insert(&mut self, parent: Parent, node: Node) -> Result<(), SyncError> {
		match (parent, node) {
			(Parent::Course, Node::Section(mut section)) => {
				section.adopt_children();
				insert_ordered(&mut self.items, CourseItem::Section(section));
			}
			(Parent::Course, Node::Lesson(mut lesson)) => {
				lesson.section_id = None;
				lesson.adopt_children();
				insert_ordered(&mut self.items, CourseItem::Lesson(lesson));
			}
			(Parent::Section(id), Node::Lesson(mut lesson)) => {
				let section = self
					.section_mut(id)
					.ok_or_else(|| SyncError::NotFound { what: format!("section #{}", id) })?;
				lesson.section_id = Some(id);
				lesson.adopt_children();
				insert_ordered(&mut section.lessons, lesson);
			}
			(Parent::Lesson(id), Node::Task(mut task)) => {
				let lesson = self
					.lesson_mut(id)
					.ok_or_else(|| SyncError::NotFound { what: format!("lesson #{}", id) })?;
				task.lesson_id = id;
				insert_ordered(&mut lesson.tasks, task);
			}
			(parent, node) => {
				return Err(SyncError::InvalidStructure {
					message: format!("{} cannot hold a {}", parent, node.kind_name()),
				});
			}
		}
		Ok(())
	}

	/// Detach a subtree, renumbering its former siblings
	pub fn remove(&mut self, key: ItemKey) -> Option<Node> {
		if key.id() == 0 {
			return None;
		}
		match key {
			ItemKey::Section(id) => {
				let pos = self
					.items
					.iter()
					.position(|i| matches!(i, CourseItem::Section(s) if s.id == id))?;
				let removed = self.items.remove(pos);
				reindex(&mut self.items);
				match removed {
					CourseItem::Section(s) => Some(Node::Section(s)),
					CourseItem::Lesson(l) => Some(Node::Lesson(l)),
				}
			}
			ItemKey::Lesson(id) => {
				if let Some(pos) =
					self.items.iter().position(|i| matches!(i, CourseItem::Lesson(l) if l.id == id))
				{
					let removed = self.items.remove(pos);
					reindex(&mut self.items);
					return match removed {
						CourseItem::Lesson(l) => Some(Node::Lesson(l)),
						CourseItem::Section(s) => Some(Node::Section(s)),
					};
				}
				for item in &mut self.items {
					if let CourseItem::Section(section) = item {
						if let Some(pos) = section.lessons.iter().position(|l| l.id == id) {
							let removed = section.lessons.remove(pos);
							reindex(&mut section.lessons);
							return Some(Node::Lesson(removed));
						}
					}
				}
				None
			}
			ItemKey::Task(id) => {
				for lesson in self.all_lessons_mut() {
					if let Some(pos) = lesson.tasks.iter().position(|t| t.id == id) {
						let removed = lesson.tasks.remove(pos);
						reindex(&mut lesson.tasks);
						return Some(Node::Task(removed));
					}
				}
				None
			}
		}
	}

	/// Replace the top-level ordering wholesale
	pub fn replace_items(&mut self, items: Vec<CourseItem>) {
		self.items = items;
		self.normalize();
	}

	/// Sort every container by index, renumber to 1..N and repair back-references
	pub fn normalize(&mut self) {
		normalize_order(&mut self.items);
		for item in &mut self.items {
			match item {
				CourseItem::Section(section) => {
					normalize_order(&mut section.lessons);
					for lesson in &mut section.lessons {
						normalize_order(&mut lesson.tasks);
					}
					section.adopt_children();
				}
				CourseItem::Lesson(lesson) => {
					lesson.section_id = None;
					normalize_order(&mut lesson.tasks);
					lesson.adopt_children();
				}
			}
		}
	}

	/// Section at a 1-based position of the top-level ordering
	pub fn section_at_mut(&mut self, index: u32) -> Option<&mut Section> {
		self.items.iter_mut().find_map(|item| match item {
			CourseItem::Section(s) if s.index == index => Some(s),
			_ => None,
		})
	}

	/// Lesson at a 1-based position inside a container
	pub fn lesson_at_mut(&mut self, parent: Parent, index: u32) -> Option<&mut Lesson> {
		match parent {
			Parent::Course => self.items.iter_mut().find_map(|item| match item {
				CourseItem::Lesson(l) if l.index == index => Some(l),
				_ => None,
			}),
			Parent::Section(id) => {
				self.section_mut(id)?.lessons.iter_mut().find(|l| l.index == index)
			}
			Parent::Lesson(_) => None,
		}
	}

	/// Ids of the tasks `task_id` depends on through placeholders that are not solved yet
	pub fn unsolved_dependencies(&self, task_id: u64) -> Vec<u64> {
		let Some(task) = self.task(task_id) else {
			return Vec::new();
		};
		let mut ids: Vec<u64> = task
			.files
			.iter()
			.flat_map(|f| f.placeholders.iter())
			.filter_map(|p| p.dependency.as_ref())
			.filter_map(|d| d.resolve(self))
			.filter(|(t, _)| !t.is_solved())
			.map(|(t, _)| t.id)
			.collect();
		ids.sort_unstable();
		ids.dedup();
		ids
	}
}

impl AnswerPlaceholderDependency {
	/// Look up the referenced task and placeholder by names
	pub fn resolve<'a>(&self, course: &'a Course) -> Option<(&'a Task, &'a AnswerPlaceholder)> {
		let lesson = match &self.section_name {
			Some(section) => course
				.sections()
				.find(|s| &s.name == section)?
				.lessons
				.iter()
				.find(|l| l.name == self.lesson_name)?,
			None => course.lessons().find(|l| l.name == self.lesson_name)?,
		};
		let task = lesson.task_named(&self.task_name)?;
		let placeholder = task
			.file(&self.file_name)?
			.placeholders
			.iter()
			.find(|p| p.index == self.placeholder_index)?;
		Some((task, placeholder))
	}
}


// vim: ts=4
