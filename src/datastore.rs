//! PostgreSQL connection pool.
//!
//! The pool is opened once at startup, shared by everything behind the
//! backends, and closed after every backend has shut down. Concurrency control
//! is the pool's own business.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::PgConfig;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DatastoreError {
    #[error("cannot connect to postgres: {0}")]
    Connect(#[from] sqlx::Error),
}

/// Open a pool sized by `pool_max` and verify one connection.
pub async fn connect(config: &PgConfig) -> Result<PgPool, DatastoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_max)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.url)
        .await?;

    tracing::info!(pool_max = config.pool_max, "Postgres pool opened");
    Ok(pool)
}

/// Close the pool, waiting for checked-out connections to return.
pub async fn close(pool: &PgPool) {
    pool.close().await;
    tracing::info!("Postgres pool closed");
}
