//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config <file> given:
//!     loader.rs (read TOML) → validation.rs → Configuration
//!
//! otherwise:
//!     remote.rs (discovery KV get, keyed by service name)
//!     → strict JSON decode → validation.rs → Configuration
//! ```
//!
//! # Design Decisions
//! - Exactly one source per process run; the two are never merged
//! - No field defaults: a missing field is an error in both sources
//! - Config is immutable once loaded

pub mod loader;
pub mod remote;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use remote::{ConfigBootstrapper, RemoteConfigError};
pub use schema::{AppConfig, Configuration, LogConfig, PgConfig, RmqConfig};
