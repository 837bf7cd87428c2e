//! Callback traits for notifications and progress events

use crate::error::SyncError;
use std::fmt;

// Type aliases to reduce complexity
type EventFn = dyn Fn(&SyncEvent) + Send + Sync;
type ErrorFn = dyn Fn(&SyncError) + Send + Sync;

/// Stage of a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	Fetch,
	Diff,
	Plan,
	Execute,
	SaveBaseline,
}

impl fmt::Display for SyncPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncPhase::Fetch => write!(f, "fetch"),
			SyncPhase::Diff => write!(f, "diff"),
			SyncPhase::Plan => write!(f, "plan"),
			SyncPhase::Execute => write!(f, "execute"),
			SyncPhase::SaveBaseline => write!(f, "save baseline"),
		}
	}
}

/// Progress reported while a reconciliation runs
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
	PhaseStarted(SyncPhase),

	/// Action `step` (1-based) of `total` finished
	ActionApplied { step: usize, total: usize, description: String },

	ActionFailed { step: usize, total: usize, error: String },

	/// Action skipped because its item or an ancestor failed earlier
	ActionSkipped { step: usize, total: usize, description: String },

	/// A directory occupying a needed name was renamed out of the way
	MovedAside { path: String, moved_to: String },
}

/// Fire-and-forget sink for user-facing messages
pub trait Notifier: Send + Sync {
	fn notify(&self, title: &str, message: &str);
}

impl<F> Notifier for F
where
	F: Fn(&str, &str) + Send + Sync,
{
	fn notify(&self, title: &str, message: &str) {
		self(title, message)
	}
}

/// Notifier that drops every message
pub struct NoNotifier;

impl Notifier for NoNotifier {
	fn notify(&self, _title: &str, _message: &str) {}
}

/// Combined callbacks consulted by the reconciler
pub trait SyncCallbacks: Send + Sync {
	fn notify(&self, _title: &str, _message: &str) {}

	fn on_event(&self, _event: &SyncEvent) {}

	fn on_error(&self, _error: &SyncError) {}
}

/// Default callback implementation that does nothing
pub struct NoCallbacks;

impl SyncCallbacks for NoCallbacks {}

/// Builder for callbacks using function closures
pub struct CallbackBuilder {
	notifier: Option<Box<dyn Notifier>>,
	event: Option<Box<EventFn>>,
	error: Option<Box<ErrorFn>>,
}

impl CallbackBuilder {
	/// Create a new callback builder
	pub fn new() -> Self {
		CallbackBuilder { notifier: None, event: None, error: None }
	}

	/// Set the notification sink
	pub fn notifier<N>(mut self, notifier: N) -> Self
	where
		N: Notifier + 'static,
	{
		self.notifier = Some(Box::new(notifier));
		self
	}

	/// Set progress callback
	pub fn on_event<F>(mut self, callback: F) -> Self
	where
		F: Fn(&SyncEvent) + Send + Sync + 'static,
	{
		self.event = Some(Box::new(callback));
		self
	}

	/// Set error callback
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&SyncError) + Send + Sync + 'static,
	{
		self.error = Some(Box::new(callback));
		self
	}

	/// Build the callbacks handler
	pub fn build(self) -> Box<dyn SyncCallbacks> {
		Box::new(CompositeCallbacks {
			notifier: self.notifier,
			event: self.event,
			error: self.error,
		})
	}
}

impl Default for CallbackBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Internal composite callbacks implementation
struct CompositeCallbacks {
	notifier: Option<Box<dyn Notifier>>,
	event: Option<Box<EventFn>>,
	error: Option<Box<ErrorFn>>,
}

impl SyncCallbacks for CompositeCallbacks {
	fn notify(&self, title: &str, message: &str) {
		if let Some(ref notifier) = self.notifier {
			notifier.notify(title, message);
		}
	}

	fn on_event(&self, event: &SyncEvent) {
		if let Some(ref callback) = self.event {
			callback(event);
		}
	}

	fn on_error(&self, error: &SyncError) {
		if let Some(ref callback) = self.error {
			callback(error);
		}
	}
}


// vim: ts=4
