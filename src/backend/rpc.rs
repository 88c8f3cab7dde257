//! Message broker RPC backend.
//!
//! # Responsibilities
//! - Connect to the broker and declare the server exchange (fanout)
//! - Bind an exclusive, server-named queue and consume from it
//! - Dispatch each delivery through the [`RpcRouter`] by its `type` property
//! - Publish the reply to the `reply_to` exchange with the same correlation id
//! - Report a lost consumer on the notify channel
//!
//! # Design Decisions
//! - Deliveries are acked after the reply is published, and rejected without
//!   requeue when publishing fails
//! - No reconnect loop: a lost connection is a fatal runtime error and the
//!   coordinator shuts the process down

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::backend::router::RpcRouter;
use crate::backend::{notify_channel, Backend, BackendError, Notify, NotifySender};
use crate::observability::metrics;

/// Time allowed for the consumer task to finish on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

const CONSUMER_TAG: &str = "microapp-rpc-server";
const CONTENT_TYPE: &str = "application/json";

/// Running RPC server.
pub struct RpcBackend {
    connection: Connection,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    notify: Option<Notify>,
    shutdown_timeout: Duration,
}

impl RpcBackend {
    /// Connect to `url`, bind to `exchange` and start consuming.
    pub async fn start(url: &str, exchange: &str, router: RpcRouter) -> Result<Self, BackendError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                queue.name().as_str(),
                exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            exchange = %exchange,
            queue = %queue.name().as_str(),
            "RPC backend consuming"
        );

        let (stop_tx, stop_rx) = oneshot::channel();
        let (notify_tx, notify) = notify_channel();
        let task = tokio::spawn(consume(channel, consumer, router, stop_rx, notify_tx));

        Ok(Self {
            connection,
            stop: Some(stop_tx),
            task: Some(task),
            notify: Some(notify),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }
}

async fn consume(
    channel: Channel,
    mut consumer: Consumer,
    router: RpcRouter,
    mut stop: oneshot::Receiver<()>,
    notify: NotifySender,
) {
    loop {
        tokio::select! {
            _ = &mut stop => {
                tracing::info!("RPC consumer received shutdown signal, exiting loop");
                return;
            }
            next = consumer.next() => match next {
                Some(Ok(delivery)) => {
                    if let Err(e) = handle(&channel, &router, delivery).await {
                        tracing::error!(error = %e, "RPC delivery handling failed");
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "RPC consumer error");
                    let _ = notify.send(BackendError::Broker(e));
                    return;
                }
                None => {
                    tracing::error!("RPC consumer stream ended");
                    let _ = notify.send(BackendError::ConsumerClosed);
                    return;
                }
            }
        }
    }
}

async fn handle(channel: &Channel, router: &RpcRouter, delivery: Delivery) -> Result<(), lapin::Error> {
    let handler = delivery
        .properties
        .kind()
        .as_ref()
        .map(|k| k.as_str().to_string())
        .unwrap_or_default();

    let reply = router.dispatch(&handler, &delivery.data);
    metrics::record_rpc_request(&handler, reply.status);
    tracing::debug!(handler = %handler, status = reply.status, "RPC request handled");

    let published = match delivery.properties.reply_to().as_ref() {
        Some(reply_to) => {
            let mut properties = BasicProperties::default()
                .with_content_type(CONTENT_TYPE.into())
                .with_kind(reply.status.into());
            if let Some(correlation_id) = delivery.properties.correlation_id().as_ref() {
                properties = properties.with_correlation_id(correlation_id.clone());
            }

            channel
                .basic_publish(
                    reply_to.as_str(),
                    "",
                    BasicPublishOptions::default(),
                    &reply.body,
                    properties,
                )
                .await
                .map(drop)
        }
        None => {
            tracing::warn!(handler = %handler, "RPC request without reply_to, dropping reply");
            Ok(())
        }
    };

    match Settlement::after(&published) {
        Settlement::Ack => delivery.ack(BasicAckOptions::default()).await,
        Settlement::Reject => {
            if let Err(e) = delivery.nack(Settlement::reject_options()).await {
                tracing::warn!(handler = %handler, error = %e, "Failed to reject RPC delivery");
            }
            published
        }
    }
}

/// How a delivery is settled once its reply has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Ack,
    /// Nack without requeue.
    Reject,
}

impl Settlement {
    fn after<T>(published: &Result<T, lapin::Error>) -> Self {
        match published {
            Ok(_) => Settlement::Ack,
            Err(_) => Settlement::Reject,
        }
    }

    fn reject_options() -> BasicNackOptions {
        BasicNackOptions {
            requeue: false,
            ..BasicNackOptions::default()
        }
    }
}

#[async_trait]
impl Backend for RpcBackend {
    fn name(&self) -> &'static str {
        "rpc"
    }

    fn notify(&mut self) -> Option<Notify> {
        self.notify.take()
    }

    async fn shutdown(&mut self) -> Result<(), BackendError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        let joined = match self.task.take() {
            Some(mut task) => match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(joined) => joined.map_err(BackendError::from),
                Err(_) => {
                    task.abort();
                    Err(BackendError::ShutdownTimeout(self.shutdown_timeout))
                }
            },
            None => return Ok(()),
        };

        // Close the connection even when the consumer task misbehaved.
        let closed = self.connection.close(200, "OK").await.map_err(BackendError::from);
        tracing::info!("RPC backend stopped");
        joined.and(closed)
    }
}
