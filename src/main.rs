//! microapp
//!
//! Bootstraps the service and runs it until shutdown.
//!
//! # Startup
//!
//! ```text
//!   CLI inputs
//!       │
//!       ├── --config <file> ──────────────▶ load TOML ─────────────┐
//!       │                                                         │
//!       └── --consul <addr> ─▶ resolve --listen ─▶ register ─▶ KV get + decode
//!                                                                 │
//!                                                                 ▼
//!                                    Coordinator: datastore → HTTP → RPC
//!                                                                 │
//!                               first of { SIGINT/SIGTERM, HTTP fail, RPC fail }
//!                                                                 │
//!                                    HTTP shutdown → RPC shutdown → close
//!                                    datastore → deregister → exit
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use microapp::bootstrap::{
    self, Inputs, DEFAULT_CHECK_SECS, DEFAULT_DISCOVERY_ADDR, DEFAULT_LISTEN, DEFAULT_SERVICE_NAME,
};
use microapp::lifecycle::{Coordinator, ServiceLauncher, ShutdownSignal};
use microapp::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "microapp")]
#[command(about = "Service bootstrap with Consul registration and remote configuration", long_about = None)]
struct Cli {
    /// Config file; takes priority over Consul.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Consul agent address. Pass an empty value to disable.
    #[arg(long, default_value = DEFAULT_DISCOVERY_ADDR)]
    consul: String,

    /// Consul ACL token.
    #[arg(long)]
    consul_token: Option<String>,

    /// Consul KV folder holding the configuration key.
    #[arg(long, default_value = "")]
    folder: String,

    /// Service name, also the KV key name.
    #[arg(short, long, default_value = DEFAULT_SERVICE_NAME)]
    name: String,

    /// Listen address; an empty host registers the first non-loopback IPv4.
    #[arg(short, long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Health check interval in seconds.
    #[arg(long, default_value_t = DEFAULT_CHECK_SECS)]
    check_interval: u64,

    /// Health check timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CHECK_SECS)]
    check_timeout: u64,
}

impl From<Cli> for Inputs {
    fn from(cli: Cli) -> Self {
        Inputs {
            config_file: cli.config,
            discovery_addr: cli.consul,
            discovery_token: cli.consul_token,
            folder: cli.folder,
            service_name: cli.name,
            listen: cli.listen,
            check_interval: Duration::from_secs(cli.check_interval),
            check_timeout: Duration::from_secs(cli.check_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let inputs = Inputs::from(Cli::parse());
    let log = logging::init();
    let shutdown = ShutdownSignal::install();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "microapp starting");

    // Installed before bootstrap so the registration outcome is counted.
    let recorder = match metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics disabled");
            None
        }
    };

    let prepared = match bootstrap::prepare(&inputs).await {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    log.apply_level(&prepared.config.log.level);
    tracing::info!(
        app = %prepared.config.app.name,
        version = %prepared.config.app.version,
        port = prepared.port,
        broker = prepared.config.rmq.is_enabled(),
        "Configuration ready"
    );

    let mut launcher = ServiceLauncher::new(recorder);
    let coordinator =
        Coordinator::new(prepared.config, prepared.port).with_registration(prepared.registration);

    match coordinator.run(&mut launcher, shutdown.recv()).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::FAILURE
        }
    }
}
