//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (coordinator.rs + launcher.rs):
//!     Open datastore → Start HTTP backend → Start RPC backend (if configured)
//!
//! Running:
//!     first of { SIGINT/SIGTERM (signals.rs), HTTP failure, RPC failure }
//!
//! Shutdown (coordinator.rs):
//!     HTTP shutdown → RPC shutdown → close datastore → deregister
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, but started backends are drained
//! - Every shutdown step is attempted; shutdown errors are only logged
//! - Deregistration runs exactly once, on every exit path of `run`

pub mod coordinator;
pub mod launcher;
pub mod signals;

pub use coordinator::{Coordinator, Launcher, LifecycleError, State, Trigger};
pub use launcher::ServiceLauncher;
pub use signals::{ShutdownSignal, Signal};
