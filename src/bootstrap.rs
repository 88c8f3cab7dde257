//! Startup preparation.
//!
//! Turns the process inputs into a configuration, a listen port and, in
//! discovery mode, a live registration:
//!
//! ```text
//! --config given   → load TOML file, port from --listen (no registration)
//! otherwise        → resolve --listen → register → fetch KV config
//! neither          → fatal
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{load_config, ConfigBootstrapper, ConfigError, Configuration, RemoteConfigError};
use crate::discovery::address::{detect_local_ipv4, resolve_with};
use crate::discovery::{
    AddressError, ConsulClient, Discovery, DiscoveryError, ListenSpec, Registrar, Registration,
};

pub const DEFAULT_DISCOVERY_ADDR: &str = "localhost:8500";
pub const DEFAULT_SERVICE_NAME: &str = "microapp";
pub const DEFAULT_LISTEN: &str = ":8080";
pub const DEFAULT_CHECK_SECS: u64 = 3;

/// Startup failure, naming the stage that failed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("no input: neither a config file nor a discovery address was provided")]
    NoConfigSource,

    #[error("config file: {0}")]
    Config(#[from] ConfigError),

    #[error("listen address: {0}")]
    Address(#[from] AddressError),

    #[error("discovery client: {0}")]
    Discovery(#[source] DiscoveryError),

    #[error("discovery registration: {0}")]
    Register(#[source] DiscoveryError),

    #[error("remote config: {0}")]
    RemoteConfig(#[from] RemoteConfigError),
}

/// Process inputs driving the bootstrap.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub config_file: Option<PathBuf>,
    pub discovery_addr: String,
    pub discovery_token: Option<String>,
    pub folder: String,
    pub service_name: String,
    pub listen: String,
    pub check_interval: Duration,
    pub check_timeout: Duration,
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            config_file: None,
            discovery_addr: DEFAULT_DISCOVERY_ADDR.to_string(),
            discovery_token: None,
            folder: String::new(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            listen: DEFAULT_LISTEN.to_string(),
            check_interval: Duration::from_secs(DEFAULT_CHECK_SECS),
            check_timeout: Duration::from_secs(DEFAULT_CHECK_SECS),
        }
    }
}

/// Where the configuration comes from. The two never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource<'a> {
    File(&'a Path),
    Discovery(&'a str),
}

impl Inputs {
    /// Select the configuration source; a config file always wins.
    pub fn source(&self) -> Result<ConfigSource<'_>, BootstrapError> {
        if let Some(path) = self.config_file.as_deref().filter(|p| !p.as_os_str().is_empty()) {
            return Ok(ConfigSource::File(path));
        }
        if !self.discovery_addr.is_empty() {
            return Ok(ConfigSource::Discovery(&self.discovery_addr));
        }
        Err(BootstrapError::NoConfigSource)
    }
}

/// Everything the coordinator needs.
#[derive(Debug)]
pub struct Prepared {
    pub config: Configuration,
    pub port: u16,
    pub registration: Option<Registration>,
}

/// Prepare using Consul and real interface detection.
pub async fn prepare(inputs: &Inputs) -> Result<Prepared, BootstrapError> {
    let token = inputs.discovery_token.clone();
    prepare_with(
        inputs,
        |addr| {
            let client = ConsulClient::new(addr)?.with_token(token);
            Ok(Arc::new(client) as Arc<dyn Discovery>)
        },
        detect_local_ipv4,
    )
    .await
}

/// Prepare with an injectable discovery client and address detector.
pub async fn prepare_with<C, D>(
    inputs: &Inputs,
    connect: C,
    detect: D,
) -> Result<Prepared, BootstrapError>
where
    C: FnOnce(&str) -> Result<Arc<dyn Discovery>, DiscoveryError>,
    D: FnOnce() -> Result<Ipv4Addr, AddressError>,
{
    match inputs.source()? {
        ConfigSource::File(path) => {
            let config = load_config(path)?;
            let port = ListenSpec::parse(&inputs.listen)?.port_number()?;
            tracing::info!(path = %path.display(), port, "Configuration loaded from file");
            Ok(Prepared {
                config,
                port,
                registration: None,
            })
        }
        ConfigSource::Discovery(addr) => {
            let listen = resolve_with(&inputs.listen, detect)?;
            let port = listen.port_number()?;
            let discovery = connect(addr).map_err(BootstrapError::Discovery)?;

            let registration = Registrar::new(discovery.clone())
                .register(
                    &inputs.service_name,
                    &listen.host,
                    port,
                    inputs.check_interval,
                    inputs.check_timeout,
                )
                .await
                .map_err(BootstrapError::Register)?;

            let bootstrapper = ConfigBootstrapper::new(discovery, inputs.folder.clone());
            match bootstrapper.fetch_and_decode(&inputs.service_name).await {
                Ok(config) => Ok(Prepared {
                    config,
                    port,
                    registration: Some(registration),
                }),
                Err(e) => {
                    registration.deregister().await;
                    Err(e.into())
                }
            }
        }
    }
}
