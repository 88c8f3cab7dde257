//! Production wiring of datastore and backends.

use std::sync::Arc;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPool;

use crate::backend::http::{HttpBackend, HttpState};
use crate::backend::{Backend, BackendError, RpcBackend, RpcRouter};
use crate::config::Configuration;
use crate::datastore::{self, DatastoreError};
use crate::lifecycle::coordinator::Launcher;

/// Launcher backed by Postgres, Axum and RabbitMQ.
#[derive(Default)]
pub struct ServiceLauncher {
    metrics: Option<PrometheusHandle>,
    pool: Option<PgPool>,
}

impl ServiceLauncher {
    pub fn new(metrics: Option<PrometheusHandle>) -> Self {
        Self {
            metrics,
            pool: None,
        }
    }
}

#[async_trait]
impl Launcher for ServiceLauncher {
    async fn open_datastore(&mut self, config: &Configuration) -> Result<(), DatastoreError> {
        self.pool = Some(datastore::connect(&config.pg).await?);
        Ok(())
    }

    async fn start_http(
        &mut self,
        config: &Configuration,
        port: u16,
    ) -> Result<Box<dyn Backend>, BackendError> {
        let state = HttpState {
            app: Arc::new(config.app.clone()),
            metrics: self.metrics.clone(),
        };
        let backend = HttpBackend::start(port, state).await?;
        Ok(Box::new(backend))
    }

    async fn start_rpc(&mut self, config: &Configuration) -> Result<Box<dyn Backend>, BackendError> {
        let router = RpcRouter::with_defaults(&config.app);
        let backend = RpcBackend::start(&config.rmq.url, &config.rmq.rpc_server_exchange, router).await?;
        Ok(Box::new(backend))
    }

    async fn close_datastore(&mut self) {
        if let Some(pool) = self.pool.take() {
            datastore::close(&pool).await;
        }
    }
}
