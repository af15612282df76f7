//! Operational HTTP surface: liveness, consumer states and prometheus metrics.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use kafka_consumer::{HostState, HostStatus};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// HTTP server exposing `/healthz`, `/consumers` and `/metrics`.
pub struct Server {
    port: u16,
    state: AppState,
}

/// Request counters for the server itself.
struct HttpMetrics {
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
}

impl HttpMetrics {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, endpoint, status.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }
}

/// State shared between request handlers.
#[derive(Clone)]
struct AppState {
    registry: Registry,
    consumers: Arc<Vec<HostStatus>>,
    metrics: Arc<HttpMetrics>,
}

/// One entry of `GET /consumers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerView {
    pub topic: String,
    pub schema: String,
    pub state: HostState,
}

impl From<&HostStatus> for ConsumerView {
    fn from(status: &HostStatus) -> Self {
        Self {
            topic: status.topic().to_string(),
            schema: status.schema().to_string(),
            state: status.state(),
        }
    }
}

impl Server {
    /// Creates a server that reports on `consumers` and renders `registry`.
    ///
    /// HTTP request metrics are registered into the same registry.
    pub fn new(port: u16, registry: Registry, consumers: Vec<HostStatus>) -> Result<Self> {
        let metrics = HttpMetrics::register(&registry).context("Failed to register HTTP metrics")?;
        info!(port, consumers = consumers.len(), "Initializing HTTP server");
        Ok(Self {
            port,
            state: AppState {
                registry,
                consumers: Arc::new(consumers),
                metrics: Arc::new(metrics),
            },
        })
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .with_context(|| format!("Failed to bind to port {}", self.port))?;

        info!(port = self.port, "HTTP server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(handle_health))
            .route("/consumers", get(handle_consumers))
            .route("/metrics", get(handle_metrics))
            .layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                metrics_middleware,
            ))
            .with_state(self.state.clone())
    }
}

async fn metrics_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    state
        .metrics
        .record_request(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

async fn handle_health() -> &'static str {
    debug!("Health check requested");
    "ok"
}

async fn handle_consumers(State(state): State<AppState>) -> Json<Vec<ConsumerView>> {
    Json(state.consumers.iter().map(ConsumerView::from).collect())
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    match prometheus::TextEncoder::new().encode_to_string(&state.registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}
