//! Human-edited YAML config files of the course layout
//!
//! Every directory of the layout carries one config file describing the item
//! it holds. File texts live next to them on disk and are not part of the
//! configs.
//!
//! ```yaml
//! # Basics/Syntax/Vals/task-info.yaml
//! type: edu
//! files:
//!   - name: Vals.kt
//!     placeholders:
//!       - offset: 8
//!         length: 6
//!         possible_answer: "1"
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FormatError, SyncError};
use crate::logging::*;
use crate::model::{
	AnswerPlaceholder, AnswerPlaceholderDependency, Course, CourseItem, ItemKey, Lesson, Section,
	StudyItem, Task, TaskFile, TaskKind,
};
use crate::storage::LocalStorage;

pub const COURSE_CONFIG: &str = "course-info.yaml";
pub const SECTION_CONFIG: &str = "section-info.yaml";
pub const LESSON_CONFIG: &str = "lesson-info.yaml";
pub const TASK_CONFIG: &str = "task-info.yaml";

const TASK_TYPES: &[&str] = &["edu", "output", "theory", "choice", "code"];

fn default_true() -> bool {
	true
}

fn is_false(value: &bool) -> bool {
	!*value
}

fn is_true(value: &bool) -> bool {
	*value
}

/// Which config file a text belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKind {
	Course,
	Section,
	Lesson,
	Task,
}

impl ConfigKind {
	pub fn file_name(self) -> &'static str {
		match self {
			ConfigKind::Course => COURSE_CONFIG,
			ConfigKind::Section => SECTION_CONFIG,
			ConfigKind::Lesson => LESSON_CONFIG,
			ConfigKind::Task => TASK_CONFIG,
		}
	}

	/// Guess the kind from a config file name
	pub fn from_file_name(name: &str) -> Option<Self> {
		match name {
			COURSE_CONFIG => Some(ConfigKind::Course),
			SECTION_CONFIG => Some(ConfigKind::Section),
			LESSON_CONFIG => Some(ConfigKind::Lesson),
			TASK_CONFIG => Some(ConfigKind::Task),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseConfig {
	pub title: String,
	#[serde(default)]
	pub summary: String,
	pub language: String,
	pub programming_language: String,
	/// Directory names of sections and top-level lessons, in display order
	#[serde(default)]
	pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
	#[serde(default)]
	pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonConfig {
	#[serde(default, skip_serializing_if = "is_false")]
	pub framework: bool,
	#[serde(default = "default_true", skip_serializing_if = "is_true")]
	pub visible: bool,
	#[serde(default)]
	pub content: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyConfig {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub section: Option<String>,
	pub lesson: String,
	pub task: String,
	pub file: String,
	pub placeholder: u32,
	#[serde(default = "default_true")]
	pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderConfig {
	pub offset: usize,
	pub length: usize,
	pub possible_answer: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub hints: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dependency: Option<DependencyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFileConfig {
	pub name: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub placeholders: Vec<PlaceholderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
	#[serde(rename = "type")]
	pub task_type: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub files: Vec<TaskFileConfig>,
	/// Choice tasks only
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<String>,
	#[serde(default, skip_serializing_if = "is_false")]
	pub multiple: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub additional_files: Vec<String>,
}

impl TaskConfig {
	pub fn kind(&self) -> Result<TaskKind, FormatError> {
		match self.task_type.as_str() {
			"edu" => Ok(TaskKind::Edu),
			"output" => Ok(TaskKind::Output),
			"theory" => Ok(TaskKind::Theory),
			"code" => Ok(TaskKind::Code),
			"choice" => {
				if self.options.is_empty() {
					return Err(FormatError::new("options is empty"));
				}
				Ok(TaskKind::Choice { options: self.options.clone(), multiple: self.multiple })
			}
			other => Err(FormatError::new(format!("Unsupported task type '{}'", other))),
		}
	}
}

/// Deserialized content of one config file
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigItem {
	Course(CourseConfig),
	Section(SectionConfig),
	Lesson(LessonConfig),
	Task(TaskConfig),
}

impl ConfigItem {
	pub fn kind(&self) -> ConfigKind {
		match self {
			ConfigItem::Course(_) => ConfigKind::Course,
			ConfigItem::Section(_) => ConfigKind::Section,
			ConfigItem::Lesson(_) => ConfigKind::Lesson,
			ConfigItem::Task(_) => ConfigKind::Task,
		}
	}

	pub fn from_course(course: &Course) -> Self {
		ConfigItem::Course(CourseConfig {
			title: course.name.clone(),
			summary: course.description.clone(),
			language: course.human_language.clone(),
			programming_language: course.language_id.clone(),
			content: course.items.iter().map(|i| i.name().to_string()).collect(),
		})
	}

	pub fn from_section(section: &Section) -> Self {
		ConfigItem::Section(SectionConfig {
			content: section.lessons.iter().map(|l| l.name.clone()).collect(),
		})
	}

	pub fn from_lesson(lesson: &Lesson) -> Self {
		ConfigItem::Lesson(LessonConfig {
			framework: lesson.framework,
			visible: lesson.is_public,
			content: lesson.tasks.iter().map(|t| t.name.clone()).collect(),
		})
	}

	pub fn from_task(task: &Task) -> Self {
		let (options, multiple) = match &task.kind {
			TaskKind::Choice { options, multiple } => (options.clone(), *multiple),
			_ => (Vec::new(), false),
		};
		let files = task
			.files
			.iter()
			.map(|file| TaskFileConfig {
				name: file.name.clone(),
				placeholders: file
					.placeholders
					.iter()
					.map(|p| PlaceholderConfig {
						offset: p.offset,
						length: p.length,
						possible_answer: p.possible_answer.clone(),
						hints: p.hints.clone(),
						dependency: p.dependency.as_ref().map(|d| DependencyConfig {
							section: d.section_name.clone(),
							lesson: d.lesson_name.clone(),
							task: d.task_name.clone(),
							file: d.file_name.clone(),
							placeholder: d.placeholder_index,
							is_visible: d.visible,
						}),
					})
					.collect(),
			})
			.collect();
		ConfigItem::Task(TaskConfig {
			task_type: task.kind.type_tag().to_string(),
			files,
			options,
			multiple,
			additional_files: task.additional_files.keys().cloned().collect(),
		})
	}
}

/// Text form of config files
pub trait ConfigCodec: Send + Sync {
	fn serialize(&self, item: &ConfigItem) -> Result<String, FormatError>;

	fn deserialize(&self, text: &str, kind: ConfigKind) -> Result<ConfigItem, FormatError>;
}

/// Turn a serde message into a user-actionable cause
///
/// A missing field `possible_answer` reads as "Possible answer is empty".
fn describe(message: &str) -> FormatError {
	if let Some(rest) = message.split("missing field `").nth(1) {
		if let Some(field) = rest.split('`').next() {
			return FormatError::new(format!("{} is empty", field.replace('_', " ").to_lowercase()));
		}
	}
	FormatError::new(message)
}

fn yaml_error(error: serde_yaml::Error) -> FormatError {
	describe(&error.to_string())
}

fn from_yaml<T: DeserializeOwned>(text: &str) -> Result<T, FormatError> {
	serde_yaml::from_str(text).map_err(yaml_error)
}

/// [`ConfigCodec`] for YAML, the format of the on-disk layout
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl YamlCodec {
	fn task(&self, text: &str) -> Result<TaskConfig, FormatError> {
		let value: serde_yaml::Value = from_yaml(text)?;
		match value.get("type") {
			None | Some(serde_yaml::Value::Null) => {
				return Err(FormatError::new("task type not specified"));
			}
			Some(serde_yaml::Value::String(tag)) if tag == "null" => {
				return Err(FormatError::new("task type not specified"));
			}
			Some(serde_yaml::Value::String(tag)) if !TASK_TYPES.contains(&tag.as_str()) => {
				return Err(FormatError::new(format!("Unsupported task type '{}'", tag)));
			}
			_ => {}
		}
		let config: TaskConfig = serde_yaml::from_value(value).map_err(yaml_error)?;
		config.kind()?;
		Ok(config)
	}
}

impl ConfigCodec for YamlCodec {
	fn serialize(&self, item: &ConfigItem) -> Result<String, FormatError> {
		let result = match item {
			ConfigItem::Course(c) => serde_yaml::to_string(c),
			ConfigItem::Section(s) => serde_yaml::to_string(s),
			ConfigItem::Lesson(l) => serde_yaml::to_string(l),
			ConfigItem::Task(t) => serde_yaml::to_string(t),
		};
		result.map_err(|e| FormatError::new(e.to_string()).in_file(item.kind().file_name()))
	}

	fn deserialize(&self, text: &str, kind: ConfigKind) -> Result<ConfigItem, FormatError> {
		let result = match kind {
			ConfigKind::Course => from_yaml(text).map(ConfigItem::Course),
			ConfigKind::Section => from_yaml(text).map(ConfigItem::Section),
			ConfigKind::Lesson => from_yaml(text).map(ConfigItem::Lesson),
			ConfigKind::Task => self.task(text).map(ConfigItem::Task),
		};
		result.map_err(|e| e.in_file(kind.file_name()))
	}
}

/// Build the replacement task described by a config, reading file texts from `dir`
async fn build_task(
	old: &Task,
	config: &TaskConfig,
	dir: &Path,
	storage: &dyn LocalStorage,
) -> Result<Task, SyncError> {
	let mut task = Task::new(&old.name, config.kind()?);
	task.id = old.id;
	task.index = old.index;
	task.lesson_id = old.lesson_id;
	task.update_date = old.update_date;
	task.status = old.status;
	task.description_text = old.description_text.clone();

	for file_config in &config.files {
		let path = dir.join(&file_config.name);
		let text = if storage.exists(&path).await {
			storage.read_file(&path).await?
		} else {
			debug!("{} listed in {} but missing, starting empty", path.display(), TASK_CONFIG);
			String::new()
		};
		let mut file = TaskFile::new(&file_config.name, &text);
		for p in &file_config.placeholders {
			let mut placeholder = AnswerPlaceholder::new(p.offset, p.length, &p.possible_answer);
			placeholder.hints = p.hints.clone();
			placeholder.dependency = p.dependency.as_ref().map(|d| AnswerPlaceholderDependency {
				section_name: d.section.clone(),
				lesson_name: d.lesson.clone(),
				task_name: d.task.clone(),
				file_name: d.file.clone(),
				placeholder_index: d.placeholder,
				visible: d.is_visible,
			});
			placeholder.student_answer = old
				.file(&file_config.name)
				.and_then(|f| f.placeholders.get(file.placeholders.len()))
				.and_then(|p| p.student_answer.clone());
			file.add_placeholder(placeholder);
		}
		task.add_file(file);
	}

	for name in &config.additional_files {
		let path = dir.join(name);
		let text = if storage.exists(&path).await {
			storage.read_file(&path).await?
		} else {
			String::new()
		};
		task.additional_files.insert(name.clone(), text);
	}
	Ok(task)
}

/// Re-read `task-info.yaml` of a task and apply it to the tree
///
/// Identity, position, name, description and progress are kept. Files and
/// placeholders are replaced. On any error the tree is left untouched.
pub async fn load_task_config(
	course: &mut Course,
	task_id: u64,
	storage: &dyn LocalStorage,
	codec: &dyn ConfigCodec,
) -> Result<(), SyncError> {
	let key = ItemKey::Task(task_id);
	let not_found = || SyncError::NotFound { what: key.to_string() };
	let old = course.task(task_id).cloned().ok_or_else(not_found)?;
	let dir = course.path_of(key).ok_or_else(not_found)?;
	let config_path = dir.join(TASK_CONFIG);
	let file = config_path.display().to_string();

	let text = storage.read_file(&config_path).await?;
	let config = match codec.deserialize(&text, ConfigKind::Task).map_err(|e| e.in_file(&file))? {
		ConfigItem::Task(config) => config,
		other => {
			return Err(FormatError::new(format!("expected a task config, got {:?}", other.kind()))
				.in_file(&file)
				.into());
		}
	};
	let task = build_task(&old, &config, &dir, storage).await?;

	if let Some(slot) = course.task_mut(task_id) {
		*slot = task;
	}
	info!("reloaded {}", file);
	Ok(())
}

/// Re-read `course-info.yaml` and apply course metadata and top-level order
///
/// Items not named in `content` keep their relative order after the named ones.
pub async fn load_course_config(
	course: &mut Course,
	storage: &dyn LocalStorage,
	codec: &dyn ConfigCodec,
) -> Result<(), SyncError> {
	let text = storage.read_file(Path::new(COURSE_CONFIG)).await?;
	let config = match codec.deserialize(&text, ConfigKind::Course)? {
		ConfigItem::Course(config) => config,
		other => {
			return Err(FormatError::new(format!("expected a course config, got {:?}", other.kind()))
				.in_file(COURSE_CONFIG)
				.into());
		}
	};

	course.name = config.title;
	course.description = config.summary;
	course.human_language = config.language;
	course.language_id = config.programming_language;

	let rank = |item: &CourseItem| {
		config.content.iter().position(|name| name == item.name()).unwrap_or(config.content.len())
	};
	let mut items = std::mem::take(&mut course.items);
	items.sort_by_key(|item| rank(item));
	for (i, item) in items.iter_mut().enumerate() {
		item.set_index(i as u32 + 1);
	}
	course.replace_items(items);
	Ok(())
}

/// Write every config file of the course through `storage`
pub async fn save_all(
	course: &Course,
	storage: &mut dyn LocalStorage,
	codec: &dyn ConfigCodec,
) -> Result<usize, SyncError> {
	let mut files: Vec<(PathBuf, ConfigItem)> =
		vec![(PathBuf::from(COURSE_CONFIG), ConfigItem::from_course(course))];
	let lesson_files = |files: &mut Vec<(PathBuf, ConfigItem)>, dir: PathBuf, lesson: &Lesson| {
		for task in &lesson.tasks {
			files.push((dir.join(&task.name).join(TASK_CONFIG), ConfigItem::from_task(task)));
		}
		files.push((dir.join(LESSON_CONFIG), ConfigItem::from_lesson(lesson)));
	};
	for item in &course.items {
		match item {
			CourseItem::Section(section) => {
				let dir = PathBuf::from(&section.name);
				files.push((dir.join(SECTION_CONFIG), ConfigItem::from_section(section)));
				for lesson in &section.lessons {
					lesson_files(&mut files, dir.join(&lesson.name), lesson);
				}
			}
			CourseItem::Lesson(lesson) => {
				lesson_files(&mut files, PathBuf::from(&lesson.name), lesson)
			}
		}
	}

	for (path, item) in &files {
		let text = codec.serialize(item)?;
		storage.write_file(path, &text).await?;
	}
	debug!("wrote {} config files", files.len());
	Ok(files.len())
}


// vim: ts=4
