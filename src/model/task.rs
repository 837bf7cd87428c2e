//! Tasks, task files and answer placeholders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::StudyItem;

/// Result of the last check of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CheckStatus {
	#[default]
	Unchecked,
	Solved,
	Failed,
}

/// Closed set of task kinds
///
/// Only the variants that need extra data carry it. Theory and choice tasks
/// have no authored files a learner could lose, see [`TaskKind::is_content_free`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskKind {
	#[default]
	Edu,
	Output,
	Theory,
	Choice {
		options: Vec<String>,
		#[serde(default)]
		multiple: bool,
	},
	Code,
}

impl TaskKind {
	/// Discriminator used in config files
	pub fn type_tag(&self) -> &'static str {
		match self {
			TaskKind::Edu => "edu",
			TaskKind::Output => "output",
			TaskKind::Theory => "theory",
			TaskKind::Choice { .. } => "choice",
			TaskKind::Code => "code",
		}
	}

	/// Theory and choice tasks are never protected by their solved status
	pub fn is_content_free(&self) -> bool {
		matches!(self, TaskKind::Theory | TaskKind::Choice { .. })
	}
}

/// Cross-task link to another placeholder, resolved by name lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPlaceholderDependency {
	pub section_name: Option<String>,
	pub lesson_name: String,
	pub task_name: String,
	pub file_name: String,
	pub placeholder_index: u32,
	#[serde(default = "default_true")]
	pub visible: bool,
}

fn default_true() -> bool {
	true
}

/// A region of a task file the learner has to fill in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnswerPlaceholder {
	pub offset: usize,
	pub length: usize,
	pub index: u32,
	pub possible_answer: String,
	#[serde(default)]
	pub hints: Vec<String>,
	#[serde(default)]
	pub dependency: Option<AnswerPlaceholderDependency>,
	/// Text typed by the learner, never compared
	#[serde(default)]
	pub student_answer: Option<String>,
}

impl AnswerPlaceholder {
	pub fn new(offset: usize, length: usize, possible_answer: &str) -> Self {
		AnswerPlaceholder {
			offset,
			length,
			possible_answer: possible_answer.to_string(),
			..Default::default()
		}
	}

	/// Field-by-field equality ignoring the student answer
	pub fn content_eq(&self, other: &AnswerPlaceholder) -> bool {
		self.offset == other.offset
			&& self.length == other.length
			&& self.index == other.index
			&& self.possible_answer == other.possible_answer
			&& self.hints == other.hints
			&& self.dependency == other.dependency
	}
}

/// A file of a task together with its placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskFile {
	pub name: String,
	pub text: String,
	#[serde(default)]
	pub placeholders: Vec<AnswerPlaceholder>,
}

impl TaskFile {
	pub fn new(name: &str, text: &str) -> Self {
		TaskFile { name: name.to_string(), text: text.to_string(), placeholders: Vec::new() }
	}

	/// Append a placeholder, assigning the next placeholder index
	pub fn add_placeholder(&mut self, mut placeholder: AnswerPlaceholder) {
		placeholder.index = self.placeholders.len() as u32;
		self.placeholders.push(placeholder);
	}

	pub fn content_eq(&self, other: &TaskFile) -> bool {
		self.name == other.name
			&& self.text == other.text
			&& self.placeholders.len() == other.placeholders.len()
			&& self.placeholders.iter().zip(&other.placeholders).all(|(a, b)| a.content_eq(b))
	}
}

/// A single exercise of a lesson
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
	#[serde(default)]
	pub id: u64,
	pub name: String,
	#[serde(default)]
	pub index: u32,
	#[serde(default = "epoch")]
	pub update_date: DateTime<Utc>,
	/// Owning lesson, resolved through the course
	#[serde(default)]
	pub lesson_id: u64,
	#[serde(default)]
	pub kind: TaskKind,
	#[serde(default)]
	pub status: CheckStatus,
	#[serde(default)]
	pub description_text: String,
	/// Display order is the order of this list, names are unique
	#[serde(default)]
	pub files: Vec<TaskFile>,
	#[serde(default)]
	pub additional_files: BTreeMap<String, String>,
}

pub(crate) fn epoch() -> DateTime<Utc> {
	DateTime::<Utc>::default()
}

impl Task {
	pub fn new(name: &str, kind: TaskKind) -> Self {
		Task {
			id: 0,
			name: name.to_string(),
			index: 0,
			update_date: epoch(),
			lesson_id: 0,
			kind,
			status: CheckStatus::Unchecked,
			description_text: String::new(),
			files: Vec::new(),
			additional_files: BTreeMap::new(),
		}
	}

	pub fn file(&self, name: &str) -> Option<&TaskFile> {
		self.files.iter().find(|f| f.name == name)
	}

	pub fn file_mut(&mut self, name: &str) -> Option<&mut TaskFile> {
		self.files.iter_mut().find(|f| f.name == name)
	}

	/// Insert a file, replacing an existing one with the same name in place
	pub fn add_file(&mut self, file: TaskFile) {
		match self.files.iter_mut().find(|f| f.name == file.name) {
			Some(existing) => *existing = file,
			None => self.files.push(file),
		}
	}

	pub fn is_solved(&self) -> bool {
		self.status == CheckStatus::Solved
	}

	/// Solved tasks with authored content must not be overwritten by a pull
	pub fn is_protected(&self) -> bool {
		self.is_solved() && !self.kind.is_content_free()
	}

	/// Authored content equality
	///
	/// Ignores id, index, name, status, dates and student answers. Files are
	/// compared as a map keyed by name.
	pub fn content_eq(&self, other: &Task) -> bool {
		if self.description_text != other.description_text
			|| self.kind != other.kind
			|| self.additional_files != other.additional_files
			|| self.files.len() != other.files.len()
		{
			return false;
		}
		self.files.iter().all(|f| other.file(&f.name).map_or(false, |o| f.content_eq(o)))
	}

	/// Copy student answers from `old` into placeholders of this task
	///
	/// Placeholders are matched by file name and placeholder index.
	pub fn carry_student_answers(&mut self, old: &Task) {
		for file in &mut self.files {
			let Some(old_file) = old.file(&file.name) else {
				continue;
			};
			for placeholder in &mut file.placeholders {
				if let Some(previous) =
					old_file.placeholders.iter().find(|p| p.index == placeholder.index)
				{
					if previous.student_answer.is_some() {
						placeholder.student_answer = previous.student_answer.clone();
					}
				}
			}
		}
	}
}

impl StudyItem for Task {
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


// vim: ts=4
