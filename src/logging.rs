//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("pull of course {} started", course.id);
//! warn!("moved {} aside to {}", path, moved_to);
//! debug!("applying {}", action);
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// Logs at INFO level and above unless `RUST_LOG` says otherwise:
///
/// ```bash
/// RUST_LOG=debug coursesync pull ...
/// RUST_LOG=coursesync::executor=debug,coursesync::diff=trace coursesync plan ...
/// ```
pub fn init_tracing() {
	init_tracing_with("info");
}

/// Same as [`init_tracing`] with a different fallback filter
pub fn init_tracing_with(default_level: &str) {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
		)
		.with_writer(std::io::stderr)
		.try_init();
}

// vim: ts=4
