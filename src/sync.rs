//! Fetch, diff, plan and execute in one reconciliation run
//!
//! ```rust,ignore
//! use coursesync::sync::Reconciler;
//!
//! let mut reconciler = Reconciler::builder()
//!     .config(config)
//!     .remote(service)
//!     .notifier(|title: &str, message: &str| eprintln!("{}: {}", title, message))
//!     .build()?;
//! let summary = reconciler.pull(&mut course).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::callbacks::{CallbackBuilder, NoCallbacks, Notifier, SyncCallbacks, SyncEvent, SyncPhase};
use crate::config::SyncConfig;
use crate::diff::{diff, ChangeSet};
use crate::error::SyncError;
use crate::executor::{ExecutionReport, Executor};
use crate::logging::*;
use crate::model::Course;
use crate::plan::{Action, ActionPlan, MetadataUpdate, Planner, Upload};
use crate::remote::RemoteCourseService;
use crate::state::StateManager;
use crate::storage::{FsStorage, LocalStorage};
use crate::strategies::Direction;

/// Cooperative cancellation flag shared between a run and its caller
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// What a finished run changed, rendered for the notification sink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
	pub direction: Direction,
	pub created: usize,
	pub deleted: usize,
	pub renamed: usize,
	/// Tasks whose files were replaced
	pub updated: usize,
	/// Items whose index, visibility or description changed in place
	pub refreshed: usize,
	/// Solved tasks whose incoming content was not applied
	pub protected: usize,
	pub moved_aside: usize,
	/// Course-wide files written
	pub additional_files: usize,
	pub course_info_updated: bool,
	pub sections_pushed: usize,
	pub lessons_pushed: usize,
	pub tasks_pushed: usize,
	pub sections_updated: usize,
	pub lessons_updated: usize,
	pub tasks_updated: usize,
}

fn count_line(lines: &mut Vec<String>, count: usize, one: &str, many: &str) {
	match count {
		0 => {}
		1 => lines.push(one.to_string()),
		n => lines.push(many.replace("{}", &n.to_string())),
	}
}

impl SyncSummary {
	/// Count the actions of `plan` that `report` lists as applied
	pub fn from_run(plan: &ActionPlan, report: &ExecutionReport) -> Self {
		let mut summary = SyncSummary {
			direction: plan.direction,
			moved_aside: report.moved_aside.len(),
			..Default::default()
		};
		for action in report.applied.iter().filter_map(|i| plan.actions.get(*i)) {
			match action {
				Action::CreateDirectory { .. } => summary.created += 1,
				Action::DeleteDirectory { .. } => summary.deleted += 1,
				Action::RenameDirectory { .. } => summary.renamed += 1,
				Action::WriteTaskContent { .. } => summary.updated += 1,
				Action::SkipProtectedTask { .. } => summary.protected += 1,
				Action::UpdateMetadataOnly(MetadataUpdate::Course(_)) => {
					summary.course_info_updated = true
				}
				Action::UpdateMetadataOnly(_) => summary.refreshed += 1,
				Action::WriteAdditionalFiles(materials) => {
					summary.additional_files += materials.files.len()
				}
				Action::UploadItem(upload) => match upload {
					Upload::CourseInfo => summary.course_info_updated = true,
					Upload::CreateSection { .. } => summary.sections_pushed += 1,
					Upload::CreateLesson { .. } => summary.lessons_pushed += 1,
					Upload::CreateTask { .. } => summary.tasks_pushed += 1,
					Upload::UpdateSection { .. } => summary.sections_updated += 1,
					Upload::UpdateLesson { .. } => summary.lessons_updated += 1,
					Upload::UpdateTask { .. } => summary.tasks_updated += 1,
				},
			}
		}
		summary
	}

	pub fn is_empty(&self) -> bool {
		*self == SyncSummary { direction: self.direction, ..Default::default() }
	}

	pub fn title(&self) -> &'static str {
		if self.is_empty() {
			"Course is up to date"
		} else {
			"Course updated"
		}
	}

	pub fn message(&self) -> String {
		let mut lines = Vec::new();
		match self.direction {
			Direction::Pull => {
				count_line(&mut lines, self.created, "One item created", "Created: {} items");
				count_line(&mut lines, self.deleted, "One item deleted", "Deleted: {} items");
				count_line(&mut lines, self.renamed, "One item renamed", "Renamed: {} items");
				count_line(&mut lines, self.updated, "One task updated", "Updated: {} tasks");
				count_line(&mut lines, self.refreshed, "One item refreshed", "Refreshed: {} items");
				count_line(
					&mut lines,
					self.protected,
					"One solved task kept",
					"Kept: {} solved tasks",
				);
				count_line(
					&mut lines,
					self.additional_files,
					"One additional file updated",
					"Updated: {} additional files",
				);
				count_line(
					&mut lines,
					self.moved_aside,
					"One directory moved aside",
					"Moved aside: {} directories",
				);
			}
			Direction::Push => {
				count_line(
					&mut lines,
					self.sections_pushed,
					"One section pushed.",
					"Pushed: {} sections.",
				);
				count_line(
					&mut lines,
					self.lessons_pushed,
					"One lesson pushed.",
					"Pushed: {} lessons.",
				);
				count_line(&mut lines, self.tasks_pushed, "One task pushed.", "Pushed: {} tasks.");
				count_line(
					&mut lines,
					self.sections_updated,
					"One section updated",
					"Updated: {} sections",
				);
				count_line(
					&mut lines,
					self.lessons_updated,
					"One lesson updated",
					"Updated: {} lessons",
				);
				count_line(&mut lines, self.tasks_updated, "One task updated", "Updated: {} tasks");
			}
		}
		if self.course_info_updated {
			lines.push("Course info updated".to_string());
		}
		if lines.is_empty() {
			"No changes".to_string()
		} else {
			lines.join("\n")
		}
	}
}

fn error_title(error: &SyncError) -> &'static str {
	match error {
		SyncError::FetchFailed { .. } => "Failed to fetch course",
		SyncError::PartialApply { .. } => "Sync incomplete",
		SyncError::Cancelled => "Sync cancelled",
		SyncError::LockFailed { .. } => "Sync already running",
		SyncError::InvalidFormat(_) => "Invalid course configuration",
		_ => "Sync failed",
	}
}

/// Runs pulls and pushes of one course root against one service
pub struct Reconciler {
	config: SyncConfig,
	remote: Box<dyn RemoteCourseService>,
	storage: Box<dyn LocalStorage>,
	callbacks: Box<dyn SyncCallbacks>,
	state: StateManager,
	cancel: CancelToken,
}

impl Reconciler {
	pub fn builder() -> ReconcilerBuilder {
		ReconcilerBuilder::new()
	}

	pub fn config(&self) -> &SyncConfig {
		&self.config
	}

	/// Token that stops the current or next run at the next checkpoint
	pub fn cancel_token(&self) -> CancelToken {
		self.cancel.clone()
	}

	pub fn storage(&self) -> &dyn LocalStorage {
		self.storage.as_ref()
	}

	/// Adopt the server snapshot into `course` and its directories
	pub async fn pull(&mut self, course: &mut Course) -> Result<SyncSummary, SyncError> {
		self.run(course, Direction::Pull).await
	}

	/// Upload local creations and changes to the server
	pub async fn push(&mut self, course: &mut Course) -> Result<SyncSummary, SyncError> {
		self.run(course, Direction::Push).await
	}

	/// Fetch, diff and plan without applying anything
	pub async fn preview(
		&mut self,
		course: &Course,
		direction: Direction,
	) -> Result<(ChangeSet, ActionPlan), SyncError> {
		let remote = self.fetch(course.id).await?;
		let baseline = self.baseline(course.id, direction).await;
		let changes = diff(course, baseline.as_ref(), &remote, direction);
		let plan = self.planner(direction).plan(&changes);
		Ok((changes, plan))
	}

	async fn run(
		&mut self,
		course: &mut Course,
		direction: Direction,
	) -> Result<SyncSummary, SyncError> {
		info!("{} of course {} '{}' started", direction, course.id, course.name);
		let result = self.reconcile(course, direction).await;
		match &result {
			Ok(summary) => {
				info!("{} finished: {}", direction, summary.message().replace('\n', ", "));
				if self.config.notify {
					self.callbacks.notify(summary.title(), &summary.message());
				}
			}
			Err(e) => {
				match e {
					SyncError::PartialApply { .. } => warn!("{} incomplete: {}", direction, e),
					_ => error!("{} failed: {}", direction, e),
				}
				self.callbacks.on_error(e);
				self.callbacks.notify(error_title(e), &e.to_string());
			}
		}
		result
	}

	fn checkpoint(&self, phase: SyncPhase) -> Result<(), SyncError> {
		if self.cancel.is_cancelled() {
			info!("cancelled before {}", phase);
			return Err(SyncError::Cancelled);
		}
		debug!("phase: {}", phase);
		self.callbacks.on_event(&SyncEvent::PhaseStarted(phase));
		Ok(())
	}

	fn planner(&self, direction: Direction) -> Planner {
		Planner::new(direction)
			.protect_solved(direction.protects_solved() && self.config.protect_solved)
	}

	async fn fetch(&mut self, course_id: u64) -> Result<Course, SyncError> {
		let mut snapshot = self
			.remote
			.fetch_snapshot(course_id)
			.await
			.map_err(|e| SyncError::FetchFailed { course_id, message: e.to_string() })?;
		if snapshot.lift_additional_materials() {
			debug!("{} additional files on the server", snapshot.additional_files.len());
		}
		snapshot.normalize();
		Ok(snapshot)
	}

	/// Baseline for a pull; an unreadable one degrades to a two-way diff
	async fn baseline(&self, course_id: u64, direction: Direction) -> Option<Course> {
		if direction != Direction::Pull {
			return None;
		}
		match self.state.load_baseline(course_id).await {
			Ok(baseline) => baseline,
			Err(e) => {
				warn!("ignoring baseline of course {}: {}", course_id, e);
				None
			}
		}
	}

	async fn reconcile(
		&mut self,
		course: &mut Course,
		direction: Direction,
	) -> Result<SyncSummary, SyncError> {
		let _lock = self.state.lock(course.id).await?;

		self.checkpoint(SyncPhase::Fetch)?;
		let remote = self.fetch(course.id).await?;

		self.checkpoint(SyncPhase::Diff)?;
		let baseline = self.baseline(course.id, direction).await;
		let changes = diff(course, baseline.as_ref(), &remote, direction);
		debug!("changes: {}", changes);

		self.checkpoint(SyncPhase::Plan)?;
		let plan = self.planner(direction).plan(&changes);
		info!("{} actions planned", plan.len());

		self.checkpoint(SyncPhase::Execute)?;
		let report = {
			let mut executor = Executor::new(self.storage.as_mut())
				.with_callbacks(self.callbacks.as_ref())
				.error_policy(self.config.error_policy)
				.aside_prefix(&self.config.aside_prefix)
				.cancel_token(self.cancel.clone());
			if direction == Direction::Push {
				executor = executor.with_remote(self.remote.as_mut());
			}
			executor.execute(course, &plan).await?
		};

		if direction == Direction::Pull {
			self.checkpoint(SyncPhase::SaveBaseline)?;
			self.state.save_baseline(&remote).await?;
		}
		Ok(SyncSummary::from_run(&plan, &report))
	}
}

/// Builder for [`Reconciler`]
pub struct ReconcilerBuilder {
	config: SyncConfig,
	remote: Option<Box<dyn RemoteCourseService>>,
	storage: Option<Box<dyn LocalStorage>>,
	callbacks: Option<Box<dyn SyncCallbacks>>,
	cancel: CancelToken,
}

impl ReconcilerBuilder {
	pub fn new() -> Self {
		ReconcilerBuilder {
			config: SyncConfig::default(),
			remote: None,
			storage: None,
			callbacks: None,
			cancel: CancelToken::new(),
		}
	}

	pub fn config(mut self, config: SyncConfig) -> Self {
		self.config = config;
		self
	}

	pub fn remote<R>(mut self, remote: R) -> Self
	where
		R: RemoteCourseService + 'static,
	{
		self.remote = Some(Box::new(remote));
		self
	}

	/// Storage to use instead of the file system under `courseRoot`
	pub fn storage<S>(mut self, storage: S) -> Self
	where
		S: LocalStorage + 'static,
	{
		self.storage = Some(Box::new(storage));
		self
	}

	pub fn callbacks(mut self, callbacks: Box<dyn SyncCallbacks>) -> Self {
		self.callbacks = Some(callbacks);
		self
	}

	/// Shorthand for callbacks that only notify
	pub fn notifier<N>(mut self, notifier: N) -> Self
	where
		N: Notifier + 'static,
	{
		self.callbacks = Some(CallbackBuilder::new().notifier(notifier).build());
		self
	}

	pub fn cancel_token(mut self, token: CancelToken) -> Self {
		self.cancel = token;
		self
	}

	pub fn build(self) -> Result<Reconciler, SyncError> {
		self.config.validate()?;
		let remote = self.remote.ok_or_else(|| SyncError::InvalidConfig {
			message: "a remote course service is required".to_string(),
		})?;
		let storage = match self.storage {
			Some(storage) => storage,
			None => Box::new(FsStorage::new(self.config.course_root.clone())),
		};
		let state = StateManager::new(self.config.state_dir.clone(), &self.config.profile);
		Ok(Reconciler {
			config: self.config,
			remote,
			storage,
			callbacks: self.callbacks.unwrap_or_else(|| Box::new(NoCallbacks)),
			state,
			cancel: self.cancel,
		})
	}
}

impl Default for ReconcilerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Lesson, Node, Parent};

	#[test]
	fn test_cancel_token_is_shared() {
		let token = CancelToken::new();
		let clone = token.clone();
		assert!(!clone.is_cancelled());
		token.cancel();
		assert!(clone.is_cancelled());
	}

	#[test]
	fn test_empty_summary_is_up_to_date() {
		let summary = SyncSummary::default();
		assert!(summary.is_empty());
		assert_eq!(summary.title(), "Course is up to date");
		assert_eq!(summary.message(), "No changes");
	}

	#[test]
	fn test_push_summary_text() {
		let summary = SyncSummary {
			direction: Direction::Push,
			lessons_pushed: 3,
			lessons_updated: 1,
			course_info_updated: true,
			..Default::default()
		};
		assert_eq!(summary.title(), "Course updated");
		assert_eq!(summary.message(), "Pushed: 3 lessons.\nOne lesson updated\nCourse info updated");
	}

	#[test]
	fn test_summary_counts_only_applied_actions() {
		let plan = ActionPlan {
			direction: Direction::Pull,
			actions: vec![
				Action::CreateDirectory { parent: Parent::Course, node: Node::Lesson(Lesson::new("A")) },
				Action::CreateDirectory { parent: Parent::Course, node: Node::Lesson(Lesson::new("B")) },
			],
		};
		let report = ExecutionReport { total: 2, applied: vec![0], ..Default::default() };
		let summary = SyncSummary::from_run(&plan, &report);
		assert_eq!(summary.created, 1);
		assert_eq!(summary.message(), "One item created");
	}

	#[test]
	fn test_builder_requires_remote() {
		assert!(matches!(Reconciler::builder().build(), Err(SyncError::InvalidConfig { .. })));
	}
}

// vim: ts=4
