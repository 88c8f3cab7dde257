//! OS signal handling.
//!
//! # Responsibilities
//! - Install SIGINT (Ctrl+C) and SIGTERM handlers at process start
//! - Report which one arrived so the shutdown path can be logged
//!
//! Handlers are installed by [`ShutdownSignal::install`], before bootstrap
//! registers the instance. A signal that arrives while the service is still
//! starting is held and ends the run as soon as it is awaited, so the normal
//! drain and deregistration path still runs.

use std::fmt;

use tokio::signal::unix::{signal, Signal as SignalStream, SignalKind};

/// Termination signal that ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Installed SIGINT and SIGTERM handlers.
pub struct ShutdownSignal {
    interrupt: Option<SignalStream>,
    terminate: Option<SignalStream>,
}

impl ShutdownSignal {
    /// Install both handlers now.
    ///
    /// If a handler cannot be installed the other one is still awaited; if
    /// neither can, [`ShutdownSignal::recv`] never resolves and only a backend
    /// failure ends the run.
    pub fn install() -> Self {
        Self {
            interrupt: listen(SignalKind::interrupt(), Signal::Interrupt),
            terminate: listen(SignalKind::terminate(), Signal::Terminate),
        }
    }

    /// Wait for the first signal, including one delivered before this call.
    pub async fn recv(mut self) -> Signal {
        let signal = tokio::select! {
            _ = wait(self.interrupt.as_mut()) => Signal::Interrupt,
            _ = wait(self.terminate.as_mut()) => Signal::Terminate,
        };
        tracing::info!(signal = %signal, "Shutdown signal received");
        signal
    }
}

fn listen(kind: SignalKind, which: Signal) -> Option<SignalStream> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::error!(error = %e, signal = %which, "Failed to install signal handler");
            None
        }
    }
}

async fn wait(stream: Option<&mut SignalStream>) {
    match stream {
        Some(stream) => {
            if stream.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}
