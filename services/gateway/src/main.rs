//! Metagen generation gateway
//!
//! Single-binary Rust service that:
//! 1. Accepts generation payloads on POST /v1/generate
//! 2. Selects an API key at random from the configured pool
//! 3. Forwards the payload to the upstream generation endpoint
//! 4. Rotates keys and backs off on quota or outage failures before answering

mod config;
mod error;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use common::Secret;
use dispatch::{Dispatcher, KeyPool};
use metrics_exporter_prometheus::PrometheusHandle;
use provider::{HttpProvider, Provider};

use crate::config::Config;
use crate::metrics::ServiceMetrics;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    provider: Arc<dyn Provider>,
    api_keys: Arc<Secret<String>>,
    max_retries: u32,
    metrics: ServiceMetrics,
    cancel: watch::Receiver<bool>,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_concurrency` so a burst
/// of generation requests queues at the door instead of fanning out into
/// hundreds of simultaneous upstream calls against the same key pool.
fn build_router(state: AppState, max_concurrency: usize) -> Router {
    Router::new()
        .route("/v1/generate", post(generate_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrency))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting metagen-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let keys_configured = KeyPool::parse(config.dispatch.raw_keys()).len();
    info!(
        listen_addr = %config.server.listen_addr,
        endpoint_url = %config.provider.endpoint_url,
        keys_configured,
        max_retries = config.dispatch.max_retries,
        "configuration loaded"
    );
    if keys_configured == 0 {
        warn!("no API keys configured, generation requests will fail until keys are provided");
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let provider = Arc::new(HttpProvider::new(
        client,
        config.provider.endpoint_url.clone(),
        config.provider.key_header.clone(),
    ));

    let metrics = ServiceMetrics::new();

    // Dispatches clone this receiver; flipping the flag on shutdown makes
    // requests parked in backoff sleeps give up instead of holding the
    // drain open for minutes.
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let app_state = AppState {
        provider,
        api_keys: Arc::new(Secret::new(config.dispatch.raw_keys().to_string())),
        max_retries: config.dispatch.max_retries,
        metrics: metrics.clone(),
        cancel: cancel_rx,
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_concurrency);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    // Clone in_flight counter for drain observability after shutdown
    let in_flight = metrics.in_flight.clone();

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. the cancellation flag flips, interrupting dispatches mid-backoff
    // 3. axum stops accepting new connections and drains in-flight requests
    // 4. DRAIN_TIMEOUT bounds how long a slow drain can block process exit
    //
    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts. We achieve this by notifying the server to drain, then
    // racing the drain against the timeout.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    // Wait for the OS signal
    shutdown_signal().await;

    // Interrupt dispatches first so backoff sleeps cannot outlive the drain
    let _ = cancel_tx.send(true);

    // Signal the server to begin draining
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Accept a generation payload and dispatch it against the key pool.
async fn generate_handler(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<serde_json::Value>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    dispatch_generate(&state, payload, request_id).await
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn dispatch_generate(
    state: &AppState,
    payload: serde_json::Value,
    request_id: String,
) -> Response {
    state.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
    state.metrics.in_flight.fetch_add(1, Ordering::Relaxed);
    let started = std::time::Instant::now();

    let payload = Arc::new(payload);
    let provider = state.provider.clone();
    let mut dispatcher =
        Dispatcher::new(state.max_retries).with_cancellation(state.cancel.clone());
    let result = dispatcher
        .execute(state.api_keys.expose(), move |key| {
            let provider = provider.clone();
            let payload = payload.clone();
            async move { provider.generate(&key, &payload).await }
        })
        .await;

    state.metrics.in_flight.fetch_sub(1, Ordering::Relaxed);
    let duration = started.elapsed().as_secs_f64();

    match result {
        Ok(value) => {
            metrics::record_request("ok", duration);
            axum::Json(value).into_response()
        }
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_request(e.kind(), duration);
            warn!(error = %e, outcome = e.kind(), "generation request failed");
            error::dispatch_error_response(&e, &request_id)
        }
    }
}

/// Health endpoint: JSON with overall status, provider status, key pool size,
/// uptime, and request counters. Returns 200 when keys are configured and the
/// provider reports healthy, 503 when degraded.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.metrics.started_at.elapsed().as_secs();
    let requests = state.metrics.requests_total.load(Ordering::Relaxed);
    let errors = state.metrics.errors_total.load(Ordering::Relaxed);
    let keys_configured = KeyPool::parse(state.api_keys.expose()).len();
    let provider_health = state.provider.health().await;

    let healthy = keys_configured > 0 && provider_health.status == "healthy";
    let (status_code, status) = if healthy {
        (axum::http::StatusCode::OK, "healthy")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": status,
            "provider": {
                "id": state.provider.id(),
                "status": provider_health.status,
                "detail": provider_health.detail,
            },
            "keys_configured": keys_configured,
            "uptime_seconds": uptime,
            "requests_served": requests,
            "errors_total": errors,
        })
        .to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
