//! Remote configuration bootstrap.
//!
//! Fetches the configuration document from the discovery backend's key-value
//! store and decodes it into a [`Configuration`]. The document is JSON with the
//! same sections as the local TOML file:
//!
//! ```text
//! {
//!   "app":      { "name": "...", "version": "..." },
//!   "logger":   { "log_level": "info" },
//!   "postgres": { "pool_max": 10, "url": "postgres://..." },
//!   "rabbitmq": { "rpc_server_exchange": "...", "rpc_client_exchange": "...", "url": "amqp://..." }
//! }
//! ```
//!
//! Decoding is all-or-nothing: a missing section, a missing or mistyped field,
//! an unknown key or a failed validation yields an error and no configuration.

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::Configuration;
use crate::config::validation::{validate_config, ValidationError};
use crate::discovery::{Discovery, DiscoveryError};

/// Failure while bootstrapping configuration from the discovery backend.
#[derive(Debug, Error)]
pub enum RemoteConfigError {
    #[error("key-value lookup for '{key}' failed: {source}")]
    Fetch {
        key: String,
        #[source]
        source: DiscoveryError,
    },

    #[error("key '{0}' not found in key-value store")]
    NotFound(String),

    #[error("key '{0}' holds an empty value")]
    Empty(String),

    #[error("cannot decode configuration document: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("configuration document is invalid: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Retrieves and decodes the configuration document for a service.
pub struct ConfigBootstrapper {
    discovery: Arc<dyn Discovery>,
    folder: String,
}

impl ConfigBootstrapper {
    /// `folder` is an optional key prefix; empty means the key is the bare
    /// service name.
    pub fn new(discovery: Arc<dyn Discovery>, folder: impl Into<String>) -> Self {
        Self {
            discovery,
            folder: folder.into(),
        }
    }

    /// Key-value key holding the document of `service_name`.
    pub fn key_for(&self, service_name: &str) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            service_name.to_string()
        } else {
            format!("{}/{}", folder, service_name)
        }
    }

    /// Fetch the document with a single KV lookup and decode it.
    pub async fn fetch_and_decode(
        &self,
        service_name: &str,
    ) -> Result<Configuration, RemoteConfigError> {
        let key = self.key_for(service_name);
        tracing::debug!(key = %key, "Fetching remote configuration");

        let blob = self
            .discovery
            .kv_get(&key)
            .await
            .map_err(|source| RemoteConfigError::Fetch {
                key: key.clone(),
                source,
            })?
            .ok_or_else(|| RemoteConfigError::NotFound(key.clone()))?;

        if blob.iter().all(u8::is_ascii_whitespace) {
            return Err(RemoteConfigError::Empty(key));
        }

        let config = decode(&blob)?;
        tracing::info!(
            key = %key,
            app = %config.app.name,
            version = %config.app.version,
            "Remote configuration loaded"
        );
        Ok(config)
    }
}

/// Strictly decode a configuration document.
pub fn decode(blob: &[u8]) -> Result<Configuration, RemoteConfigError> {
    let config: Configuration = serde_json::from_slice(blob)?;
    validate_config(&config).map_err(RemoteConfigError::Invalid)?;
    Ok(config)
}
