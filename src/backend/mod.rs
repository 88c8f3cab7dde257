//! Long-running server backends.
//!
//! # Contract
//! ```text
//! constructed (bound / connected, serving in its own task)
//!     → notify(): one-shot channel, fires once on a fatal runtime error
//!     → shutdown(): stop serving, wait for in-flight work, release
//! ```
//!
//! Each backend owns its internal concurrency. The lifecycle coordinator only
//! races the notify channels and calls `shutdown` in order.

pub mod http;
pub mod router;
pub mod rpc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

pub use http::HttpBackend;
pub use router::RpcRouter;
pub use rpc::RpcBackend;

/// Errors produced by a backend at construction, runtime or shutdown.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("consumer stream ended")]
    ConsumerClosed,

    #[error("shutdown timed out after {0:?}")]
    ShutdownTimeout(std::time::Duration),

    #[error("serving task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

/// Receiving side of a backend's failure notification.
pub type Notify = oneshot::Receiver<BackendError>;

/// Sending side kept by the backend's serving task.
pub type NotifySender = oneshot::Sender<BackendError>;

/// Create a notification pair.
pub fn notify_channel() -> (NotifySender, Notify) {
    oneshot::channel()
}

/// A running server handle.
#[async_trait]
pub trait Backend: Send {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Take the failure notification. Returns `None` once taken.
    fn notify(&mut self) -> Option<Notify>;

    /// Stop the backend, blocking until it has drained or timed out.
    async fn shutdown(&mut self) -> Result<(), BackendError>;
}
