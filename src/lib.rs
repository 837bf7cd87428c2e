//! # coursesync - Three-way Course Synchronization
//!
//! coursesync keeps a local working copy of a programming course (sections,
//! lessons, tasks, files and answer placeholders) in step with a remote
//! course-hosting service. A run fetches the server snapshot, diffs it against
//! the local tree and the last adopted snapshot, turns the differences into an
//! ordered action plan and applies that plan to the tree and its directories.
//!
//! ## Pulling a Course
//!
//! ```rust,ignore
//! use coursesync::sync::Reconciler;
//! use coursesync::remote::SnapshotFile;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut reconciler = Reconciler::builder()
//!         .config(coursesync::SyncConfig::load(None)?)
//!         .remote(SnapshotFile::new("server.json"))
//!         .build()?;
//!     let summary = reconciler.pull(&mut course).await?;
//!     println!("{}", summary.message());
//!     Ok(())
//! }
//! ```
//!
//! ## Planning Without Applying
//!
//! ```rust,ignore
//! use coursesync::{diff::diff, plan::Planner, strategies::Direction};
//!
//! let changes = diff(&local, baseline.as_ref(), &remote, Direction::Pull);
//! let plan = Planner::new(Direction::Pull).plan(&changes);
//! println!("{}", plan);
//! ```

pub mod callbacks;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod plan;
pub mod remote;
pub mod state;
pub mod storage;
pub mod strategies;
pub mod sync;

// Re-export commonly used types and functions
pub use config::SyncConfig;
pub use error::{FormatError, RemoteError, StateError, SyncError};
pub use model::{Course, CourseItem, Lesson, Section, StudyItem, Task};
pub use strategies::{Direction, ErrorPolicy};
pub use sync::{CancelToken, Reconciler, SyncSummary};

// vim: ts=4
