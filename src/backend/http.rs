//! HTTP backend.
//!
//! # Responsibilities
//! - Bind the listen port and serve the Axum router in a background task
//! - Expose `/healthz` for the discovery health check
//! - Expose `/version` and `/metrics`
//! - Report serve errors on the notify channel
//! - Graceful shutdown bounded by a timeout

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::backend::{notify_channel, Backend, BackendError, Notify};
use crate::config::AppConfig;
use crate::discovery::registrar::HEALTH_CHECK_PATH;

/// Time allowed for in-flight requests on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared with the handlers.
#[derive(Clone)]
pub struct HttpState {
    pub app: Arc<AppConfig>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Serialize)]
struct VersionBody<'a> {
    name: &'a str,
    version: &'a str,
}

/// Build the router served by the backend.
#[allow(deprecated)]
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route(HEALTH_CHECK_PATH, get(healthz))
        .route("/version", get(version))
        .route("/metrics", get(render_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn version(State(state): State<HttpState>) -> impl IntoResponse {
    Json(VersionBody {
        name: &state.app.name,
        version: &state.app.version,
    })
    .into_response()
}

async fn render_metrics(State(state): State<HttpState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Running HTTP server.
pub struct HttpBackend {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    notify: Option<Notify>,
}

impl HttpBackend {
    /// Bind `0.0.0.0:port` and start serving.
    pub async fn start(port: u16, state: HttpState) -> Result<Self, BackendError> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .await
            .map_err(BackendError::Bind)?;
        Self::serve(listener, router(state))
    }

    /// Serve `app` on an already bound listener.
    pub fn serve(listener: TcpListener, app: Router) -> Result<Self, BackendError> {
        let local_addr = listener.local_addr().map_err(BackendError::Bind)?;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let (notify_tx, notify) = notify_channel();

        tracing::info!(address = %local_addr, "HTTP backend starting");

        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP backend stopped with error");
                let _ = notify_tx.send(BackendError::Serve(e));
            } else {
                tracing::info!("HTTP backend stopped");
            }
        });

        Ok(Self {
            local_addr,
            stop: Some(stop_tx),
            task: Some(task),
            notify: Some(notify),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn notify(&mut self) -> Option<Notify> {
        self.notify.take()
    }

    async fn shutdown(&mut self) -> Result<(), BackendError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };

        match tokio::time::timeout(DEFAULT_SHUTDOWN_TIMEOUT, &mut task).await {
            Ok(joined) => joined.map_err(BackendError::from),
            Err(_) => {
                task.abort();
                Err(BackendError::ShutdownTimeout(DEFAULT_SHUTDOWN_TIMEOUT))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> HttpState {
        HttpState {
            app: Arc::new(AppConfig {
                name: "microapp".into(),
                version: "1.2.3".into(),
            }),
            metrics: None,
        }
    }

    #[tokio::test]
    async fn healthz_ok() {
        let res = router(state())
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn version_reports_app() {
        let res = router(state())
            .oneshot(Request::get("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "microapp");
        assert_eq!(value["version"], "1.2.3");
    }

    #[tokio::test]
    async fn metrics_absent_without_recorder() {
        let res = router(state())
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn serves_and_shuts_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut backend = HttpBackend::serve(listener, router(state())).unwrap();
        let addr = backend.local_addr();

        let res = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
        assert_eq!(res.status(), 200);
        drop(res);

        let mut notify = backend.notify().unwrap();
        assert!(backend.notify().is_none());

        backend.shutdown().await.unwrap();
        // Graceful stop drops the sender without reporting an error.
        assert!(notify.try_recv().is_err());
    }
}
