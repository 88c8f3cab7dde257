//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Apply the configured log level after configuration is known
//!
//! # Design Decisions
//! - `RUST_LOG` takes precedence over the configured level
//! - Starts at `info` so bootstrap stages are visible before config loads

use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

const BOOTSTRAP_FILTER: &str = "info";

/// Handle for adjusting the global log filter after initialization.
pub struct LogHandle {
    reload: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Install the global subscriber.
pub fn init() -> LogHandle {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(BOOTSTRAP_FILTER), false),
    };
    let (filter, reload) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogHandle { reload, from_env }
}

impl LogHandle {
    /// Switch to the configured level unless `RUST_LOG` was set.
    pub fn apply_level(&self, level: &str) {
        if self.from_env {
            tracing::debug!(level, "RUST_LOG set, ignoring configured log level");
            return;
        }

        let directive = filter_directive(level);
        match self.reload.modify(|filter| *filter = EnvFilter::new(&directive)) {
            Ok(()) => tracing::info!(level = %directive, "Log level applied"),
            Err(e) => tracing::warn!(error = %e, "Failed to apply log level"),
        }
    }
}

/// Turn a configured level into a filter directive.
pub fn filter_directive(level: &str) -> String {
    level.trim().to_ascii_lowercase()
}
