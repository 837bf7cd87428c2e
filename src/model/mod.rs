//! In-memory course tree
//!
//! Ownership flows strictly downwards: a [`Course`] owns its sections and
//! top-level lessons, a [`Section`] owns lessons, a [`Lesson`] owns tasks and
//! a [`Task`] owns its files. Navigation upwards goes through stored parent
//! ids (`Lesson::section_id`, `Task::lesson_id`) resolved by the course.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod course;
pub mod task;

pub use course::{Course, CourseItem, Lesson, Section};
pub use task::{
	AnswerPlaceholder, AnswerPlaceholderDependency, CheckStatus, Task, TaskFile, TaskKind,
};

/// Common contract of every node in the course hierarchy
pub trait StudyItem {
	/// Server identity, 0 when the item only exists locally
	fn id(&self) -> u64;

	fn name(&self) -> &str;

	/// 1-based position among siblings
	fn index(&self) -> u32;

	fn set_index(&mut self, index: u32);

	fn update_date(&self) -> DateTime<Utc>;

	fn is_visible(&self) -> bool {
		true
	}

	fn info(&self) -> ItemInfo {
		ItemInfo {
			id: self.id(),
			name: self.name().to_string(),
			index: self.index(),
			visible: self.is_visible(),
		}
	}
}

/// The fields compared to detect an info change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
	pub id: u64,
	pub name: String,
	pub index: u32,
	pub visible: bool,
}

/// Identity of an item that has a server id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKey {
	Section(u64),
	Lesson(u64),
	Task(u64),
}

impl ItemKey {
	pub fn id(&self) -> u64 {
		match self {
			ItemKey::Section(id) | ItemKey::Lesson(id) | ItemKey::Task(id) => *id,
		}
	}
}

impl fmt::Display for ItemKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ItemKey::Section(id) => write!(f, "section #{}", id),
			ItemKey::Lesson(id) => write!(f, "lesson #{}", id),
			ItemKey::Task(id) => write!(f, "task #{}", id),
		}
	}
}

/// Container an item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parent {
	Course,
	Section(u64),
	Lesson(u64),
}

impl Parent {
	/// The key of the container, `None` for the course root
	pub fn key(&self) -> Option<ItemKey> {
		match self {
			Parent::Course => None,
			Parent::Section(id) => Some(ItemKey::Section(*id)),
			Parent::Lesson(id) => Some(ItemKey::Lesson(*id)),
		}
	}
}

impl fmt::Display for Parent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.key() {
			Some(key) => write!(f, "{}", key),
			None => write!(f, "course"),
		}
	}
}

/// An owned subtree that can be inserted into or removed from a course
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
	Section(Section),
	Lesson(Lesson),
	Task(Task),
}

impl Node {
	pub fn key(&self) -> ItemKey {
		match self {
			Node::Section(s) => ItemKey::Section(s.id),
			Node::Lesson(l) => ItemKey::Lesson(l.id),
			Node::Task(t) => ItemKey::Task(t.id),
		}
	}

	pub fn name(&self) -> &str {
		match self {
			Node::Section(s) => &s.name,
			Node::Lesson(l) => &l.name,
			Node::Task(t) => &t.name,
		}
	}

	pub fn index(&self) -> u32 {
		match self {
			Node::Section(s) => s.index,
			Node::Lesson(l) => l.index,
			Node::Task(t) => t.index,
		}
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			Node::Section(_) => "section",
			Node::Lesson(_) => "lesson",
			Node::Task(_) => "task",
		}
	}
}

/// Renumber siblings to 1..N in their current order
pub fn reindex<T: StudyItem>(items: &mut [T]) {
	for (i, item) in items.iter_mut().enumerate() {
		item.set_index(i as u32 + 1);
	}
}

/// Stable sort by index, then renumber to 1..N
pub fn normalize_order<T: StudyItem>(items: &mut [T]) {
	items.sort_by_key(|item| item.index());
	reindex(items);
}

/// Insert `item` at the position named by its own index
///
/// Siblings are ordered by their current index first so that indices
/// assigned before the insertion are honoured.
pub fn insert_ordered<T: StudyItem>(items: &mut Vec<T>, item: T) {
	items.sort_by_key(|i| i.index());
	let position = (item.index().max(1) as usize - 1).min(items.len());
	items.insert(position, item);
	reindex(items);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn tasks(names: &[(&str, u32)]) -> Vec<Task> {
		names
			.iter()
			.map(|(name, index)| {
				let mut t = Task::new(name, TaskKind::Edu);
				t.index = *index;
				t
			})
			.collect()
	}

	fn names(items: &[Task]) -> Vec<&str> {
		items.iter().map(|t| t.name.as_str()).collect()
	}

	#[test]
	fn test_insert_ordered_honours_assigned_indices() {
		let mut items = tasks(&[("a", 3), ("b", 1)]);
		let mut c = Task::new("c", TaskKind::Edu);
		c.index = 2;
		insert_ordered(&mut items, c);
		assert_eq!(names(&items), vec!["b", "c", "a"]);
		assert_eq!(items.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);
	}

	#[test]
	fn test_insert_ordered_clamps_position() {
		let mut items = tasks(&[("a", 1)]);
		let mut b = Task::new("b", TaskKind::Edu);
		b.index = 10;
		insert_ordered(&mut items, b);
		assert_eq!(names(&items), vec!["a", "b"]);
		assert_eq!(items[1].index, 2);
	}

	#[test]
	fn test_normalize_order_closes_gaps() {
		let mut items = tasks(&[("a", 5), ("b", 2), ("c", 9)]);
		normalize_order(&mut items);
		assert_eq!(names(&items), vec!["b", "a", "c"]);
		assert_eq!(items.iter().map(|t| t.index).collect::<Vec<_>>(), vec![1, 2, 3]);
	}

	#[test]
	fn test_item_key_display() {
		assert_eq!(ItemKey::Lesson(5).to_string(), "lesson #5");
		assert_eq!(Parent::Course.to_string(), "course");
		assert_eq!(Parent::Section(2).to_string(), "section #2");
	}
}

// vim: ts=4
