//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! --listen spec
//!     → address.rs (split host:port, detect local IPv4 when host empty)
//!     → registrar.rs (build registration + /healthz check, register)
//!     → Registration handle (owned by the lifecycle coordinator)
//!     → deregistered exactly once on shutdown
//! ```
//!
//! The backend itself (Consul) is reached through the [`Discovery`] trait so
//! the registrar and the config bootstrapper can be exercised without a live
//! agent.

pub mod address;
pub mod consul;
pub mod registrar;

use async_trait::async_trait;
use thiserror::Error;

pub use address::{detect_local_ipv4, resolve_with, AddressError, ListenSpec};
pub use consul::ConsulClient;
pub use registrar::{HealthCheck, Registrar, Registration, ServiceRegistration};

/// Errors returned by a discovery backend.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Backend address could not be turned into a URL.
    #[error("invalid discovery address '{0}'")]
    InvalidAddress(String),

    /// Transport-level failure (connection refused, timeout, ...).
    #[error("discovery request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("discovery backend returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Operations consumed from the discovery backend.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Register (or re-register) a service instance.
    async fn register(&self, registration: &ServiceRegistration) -> Result<(), DiscoveryError>;

    /// Remove a service instance by id.
    async fn deregister(&self, instance_id: &str) -> Result<(), DiscoveryError>;

    /// Read a key from the key-value store. `Ok(None)` means the key is absent.
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, DiscoveryError>;
}
