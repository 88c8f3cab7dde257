//! Service registration with the discovery backend.
//!
//! # Responsibilities
//! - Build the instance registration and its HTTP health check
//! - Register once (no internal retry)
//! - Hand back a [`Registration`] that deregisters exactly once
//!
//! # Design Decisions
//! - Instance id is `{name}_{host}:{port}`, so re-registering the same
//!   instance overwrites the previous entry instead of duplicating it
//! - Deregistration is best-effort: failures are logged, never returned

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::discovery::{Discovery, DiscoveryError};
use crate::observability::metrics;

/// Path the discovery backend probes on the HTTP backend.
pub const HEALTH_CHECK_PATH: &str = "/healthz";

const CHECK_NOTES: &str = "Consul check service health status.";

/// HTTP health check attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(rename = "HTTP")]
    pub http: String,
    pub interval: String,
    pub timeout: String,
    pub notes: String,
}

/// Service instance as registered with the discovery backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub check: HealthCheck,
}

impl ServiceRegistration {
    /// Build the registration for `name` listening on `host:port`.
    pub fn new(
        name: &str,
        host: &str,
        port: u16,
        check_interval: Duration,
        check_timeout: Duration,
    ) -> Self {
        let address = format!("{}:{}", host, port);
        Self {
            id: instance_id(name, host, port),
            name: name.to_string(),
            address: host.to_string(),
            port,
            check: HealthCheck {
                http: format!("http://{}{}", address, HEALTH_CHECK_PATH),
                interval: render_secs(check_interval),
                timeout: render_secs(check_timeout),
                notes: CHECK_NOTES.to_string(),
            },
        }
    }
}

/// Deterministic instance id for a service at `host:port`.
pub fn instance_id(name: &str, host: &str, port: u16) -> String {
    format!("{}_{}:{}", name, host, port)
}

fn render_secs(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

/// Registers service instances with a discovery backend.
#[derive(Clone)]
pub struct Registrar {
    discovery: Arc<dyn Discovery>,
}

impl Registrar {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self { discovery }
    }

    /// Register `name` at `host:port` and return the live registration.
    pub async fn register(
        &self,
        name: &str,
        host: &str,
        port: u16,
        check_interval: Duration,
        check_timeout: Duration,
    ) -> Result<Registration, DiscoveryError> {
        let registration = ServiceRegistration::new(name, host, port, check_interval, check_timeout);

        match self.discovery.register(&registration).await {
            Ok(()) => {
                metrics::record_registration(true);
                tracing::info!(
                    instance_id = %registration.id,
                    health_check = %registration.check.http,
                    interval = %registration.check.interval,
                    timeout = %registration.check.timeout,
                    "Service registered"
                );
                Ok(Registration {
                    discovery: self.discovery.clone(),
                    instance_id: registration.id,
                    released: false,
                })
            }
            Err(e) => {
                metrics::record_registration(false);
                Err(e)
            }
        }
    }
}

/// A live registration.
///
/// Consumed by [`Registration::deregister`], so an instance can only be
/// deregistered once through it.
pub struct Registration {
    discovery: Arc<dyn Discovery>,
    instance_id: String,
    released: bool,
}

impl Registration {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Deregister the instance. Failures are logged only.
    pub async fn deregister(mut self) {
        self.released = true;
        match self.discovery.deregister(&self.instance_id).await {
            Ok(()) => tracing::info!(instance_id = %self.instance_id, "Service deregistered"),
            Err(e) => tracing::error!(
                instance_id = %self.instance_id,
                error = %e,
                "Service deregistration failed"
            ),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                instance_id = %self.instance_id,
                "Registration dropped without deregistering"
            );
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("instance_id", &self.instance_id)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_shape() {
        let reg = ServiceRegistration::new(
            "microapp",
            "10.0.0.7",
            8080,
            Duration::from_secs(3),
            Duration::from_secs(5),
        );
        assert_eq!(reg.id, "microapp_10.0.0.7:8080");
        assert_eq!(reg.address, "10.0.0.7");
        assert_eq!(reg.port, 8080);
        assert_eq!(reg.check.http, "http://10.0.0.7:8080/healthz");
        assert_eq!(reg.check.interval, "3s");
        assert_eq!(reg.check.timeout, "5s");
    }

    #[test]
    fn serializes_as_agent_payload() {
        let reg = ServiceRegistration::new(
            "microapp",
            "10.0.0.7",
            8080,
            Duration::from_secs(3),
            Duration::from_secs(3),
        );
        let value = serde_json::to_value(&reg).unwrap();
        assert_eq!(value["ID"], "microapp_10.0.0.7:8080");
        assert_eq!(value["Name"], "microapp");
        assert_eq!(value["Address"], "10.0.0.7");
        assert_eq!(value["Port"], 8080);
        assert_eq!(value["Check"]["HTTP"], "http://10.0.0.7:8080/healthz");
        assert_eq!(value["Check"]["Interval"], "3s");
        assert_eq!(value["Check"]["Timeout"], "3s");
    }

    #[test]
    fn instance_id_is_deterministic() {
        assert_eq!(
            instance_id("svc", "host", 1),
            instance_id("svc", "host", 1)
        );
        assert_ne!(instance_id("svc", "host", 1), instance_id("svc", "host", 2));
    }
}
