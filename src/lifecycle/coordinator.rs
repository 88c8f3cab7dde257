//! Lifecycle coordination.
//!
//! # States
//! ```text
//! Idle → Starting → Running → Draining → Stopped
//! ```
//!
//! # State Transitions
//! - Starting: open datastore, start HTTP backend, start RPC backend when a
//!   broker URL is configured
//! - Running: wait for the first of {termination signal, HTTP failure, RPC
//!   failure}; absent backends contribute no event source
//! - Draining: shut down every started backend, HTTP first, each attempted
//!   regardless of the others' results
//! - Stopped: close datastore, deregister from discovery (exactly once)
//!
//! A startup failure skips Running but still drains whatever had started and
//! still reaches Stopped.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::{select_all, BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::watch;

use crate::backend::{Backend, BackendError};
use crate::config::Configuration;
use crate::datastore::DatastoreError;
use crate::discovery::Registration;
use crate::lifecycle::signals::Signal;
use crate::observability::metrics;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Why the coordinator left `Running`.
#[derive(Debug)]
pub enum Trigger {
    Signal(Signal),
    BackendFailed {
        backend: &'static str,
        error: BackendError,
    },
}

impl Trigger {
    fn label(&self) -> &'static str {
        match self {
            Trigger::Signal(_) => "signal",
            Trigger::BackendFailed { backend, .. } => *backend,
        }
    }
}

/// Fatal outcomes of a run.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("datastore connection failed: {0}")]
    Datastore(#[from] DatastoreError),

    #[error("{backend} backend failed to start: {source}")]
    Start {
        backend: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{backend} backend failed: {source}")]
    Backend {
        backend: &'static str,
        #[source]
        source: BackendError,
    },
}

/// Builds the resources and backends the coordinator sequences.
#[async_trait]
pub trait Launcher: Send {
    /// Open the shared datastore pool.
    async fn open_datastore(&mut self, config: &Configuration) -> Result<(), DatastoreError>;

    /// Start the HTTP backend on `port`.
    async fn start_http(
        &mut self,
        config: &Configuration,
        port: u16,
    ) -> Result<Box<dyn Backend>, BackendError>;

    /// Start the broker RPC backend. Only called when a broker URL is set.
    async fn start_rpc(&mut self, config: &Configuration) -> Result<Box<dyn Backend>, BackendError>;

    /// Release the datastore pool. Must be a no-op when it was never opened.
    async fn close_datastore(&mut self);
}

/// Top-level owner of a process run.
pub struct Coordinator {
    config: Configuration,
    port: u16,
    registration: Option<Registration>,
    state: watch::Sender<State>,
}

impl Coordinator {
    pub fn new(config: Configuration, port: u16) -> Self {
        let (state, _) = watch::channel(State::Idle);
        Self {
            config,
            port,
            registration: None,
            state,
        }
    }

    /// Hand over the discovery registration to release on `Stopped`.
    pub fn with_registration(mut self, registration: Option<Registration>) -> Self {
        self.registration = registration;
        self
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Run until a termination signal or a backend failure, then tear down.
    ///
    /// Returns `Ok` only when a signal ended the run.
    pub async fn run<L, S>(mut self, launcher: &mut L, signal: S) -> Result<(), LifecycleError>
    where
        L: Launcher + ?Sized,
        S: Future<Output = Signal> + Send + 'static,
    {
        let outcome = self.serve(launcher, signal).await;

        launcher.close_datastore().await;
        if let Some(registration) = self.registration.take() {
            registration.deregister().await;
        }
        self.transition(State::Stopped);

        outcome
    }

    async fn serve<L, S>(&mut self, launcher: &mut L, signal: S) -> Result<(), LifecycleError>
    where
        L: Launcher + ?Sized,
        S: Future<Output = Signal> + Send + 'static,
    {
        self.transition(State::Starting);

        launcher.open_datastore(&self.config).await?;

        let mut backends: Vec<Box<dyn Backend>> = Vec::with_capacity(2);
        let http = launcher
            .start_http(&self.config, self.port)
            .await
            .map_err(|source| LifecycleError::Start {
                backend: "http",
                source,
            })?;
        backends.push(http);

        if self.config.rmq.is_enabled() {
            match launcher.start_rpc(&self.config).await {
                Ok(rpc) => backends.push(rpc),
                Err(source) => {
                    self.transition(State::Draining);
                    drain(&mut backends).await;
                    return Err(LifecycleError::Start {
                        backend: "rpc",
                        source,
                    });
                }
            }
        } else {
            tracing::info!("No broker URL configured, RPC backend disabled");
        }

        self.transition(State::Running);
        let trigger = wait_for_trigger(signal, &mut backends).await;
        metrics::record_shutdown(trigger.label());

        self.transition(State::Draining);
        drain(&mut backends).await;

        match trigger {
            Trigger::Signal(_) => Ok(()),
            Trigger::BackendFailed { backend, error } => Err(LifecycleError::Backend {
                backend,
                source: error,
            }),
        }
    }

    fn transition(&self, next: State) {
        let previous = self.state.send_replace(next);
        tracing::debug!(from = ?previous, to = ?next, "Lifecycle transition");
    }
}

/// Race the signal against every backend's failure notification.
async fn wait_for_trigger<S>(signal: S, backends: &mut [Box<dyn Backend>]) -> Trigger
where
    S: Future<Output = Signal> + Send + 'static,
{
    let mut sources: Vec<BoxFuture<'static, Trigger>> = vec![signal.map(Trigger::Signal).boxed()];

    for backend in backends.iter_mut() {
        let name = backend.name();
        if let Some(notify) = backend.notify() {
            sources.push(
                async move {
                    let error = notify.await.unwrap_or_else(|_| {
                        BackendError::Other("stopped without reporting an error".to_string())
                    });
                    Trigger::BackendFailed {
                        backend: name,
                        error,
                    }
                }
                .boxed(),
            );
        }
    }

    let (trigger, _, _) = select_all(sources).await;
    match &trigger {
        Trigger::Signal(signal) => tracing::info!(signal = %signal, "Shutting down"),
        Trigger::BackendFailed { backend, error } => {
            tracing::error!(backend = %backend, error = %error, "Backend failed, shutting down")
        }
    }
    trigger
}

/// Shut down backends in order. Every backend is attempted.
async fn drain(backends: &mut [Box<dyn Backend>]) {
    for backend in backends.iter_mut() {
        let name = backend.name();
        match backend.shutdown().await {
            Ok(()) => tracing::info!(backend = %name, "Backend shut down"),
            Err(e) => {
                metrics::record_shutdown_error(name);
                tracing::error!(backend = %name, error = %e, "Backend shutdown failed");
            }
        }
    }
}
