//! Content Studio
//!
//! Single-binary Rust service that:
//! 1. Loads Gemini API keys from the settings file (migrating the legacy single key)
//! 2. Rotates requests across the keys, failing over when one is rate limited
//! 3. Serves text, image, content, brand-asset and GEO endpoints over HTTP
//! 4. Exposes a key management API, optionally on its own listener

mod admin;
mod api;
mod config;
mod content;
mod error;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use gemini::{GeminiClient, KeyStore};
use key_pool::{GenerationClient, KeyPool};

use crate::admin::AdminState;
use crate::api::Generator;
use crate::config::Config;

/// Time allowed for in-flight requests to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the health and metrics handlers
#[derive(Clone)]
struct AppState {
    pool: Arc<KeyPool<GeminiClient>>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the public router: health, metrics, generation endpoints and, when
/// `admin` is given, the key management endpoints.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(
    state: AppState,
    generator: Generator,
    admin: Option<AdminState>,
    max_connections: usize,
) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(api::build_api_router(generator));
    if let Some(admin) = admin {
        router = router.merge(admin::build_admin_router(admin));
    }
    router.layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
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

    info!("starting content-studio");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

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

    info!(
        listen_addr = %config.server.listen_addr,
        admin_addr = ?config.server.admin_addr,
        base_url = %config.gemini.base_url,
        default_model = %config.gemini.default_model,
        settings_path = %config.storage.settings_path.display(),
        "configuration loaded"
    );

    let store = KeyStore::open(config.storage.settings_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open settings file {}",
                config.storage.settings_path.display()
            )
        })?;
    let store = Arc::new(store);

    // Runs the legacy single-key migration before anything else touches the list.
    store
        .load_keys()
        .await
        .context("failed to load stored API keys")?;

    if let Some(seed) = &config.gemini.api_key {
        if store
            .save_key(seed.expose())
            .await
            .context("failed to store seed API key")?
            .is_some()
        {
            info!(key_hint = %seed.hint(), "seed API key added to store");
        }
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gemini.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let base_url = config.gemini.base_url.clone();
    let pool = Arc::new(KeyPool::new(move |key| {
        GeminiClient::new(http_client.clone(), &base_url, key)
    }));
    pool.load(store.keys().await).await;

    let keys_total = pool.size().await;
    if keys_total == 0 {
        warn!("no API keys configured, generation requests fail until a key is added");
    } else {
        info!(keys_total, "key pool initialized");
    }

    let generator = GenerationClient::new(pool.clone(), config.gemini.default_model.clone());
    let admin_state = AdminState::new(store.clone(), pool.clone());

    let app_state = AppState {
        pool: pool.clone(),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    // Admin routes share the public listener only when no admin_addr is set.
    let (public_admin, separate_admin) = match config.server.admin_addr {
        Some(addr) => (None, Some((addr, admin::build_admin_router(admin_state)))),
        None => (Some(admin_state), None),
    };

    let app = build_router(
        app_state,
        generator,
        public_admin,
        config.server.max_connections,
    );

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut servers = vec![spawn_server(listener, app, shutdown_rx.clone())];
    info!(addr = %listen_addr, "accepting requests");

    if let Some((admin_addr, admin_app)) = separate_admin {
        let admin_listener = TcpListener::bind(admin_addr)
            .await
            .with_context(|| format!("failed to bind admin listener to {admin_addr}"))?;
        servers.push(spawn_server(admin_listener, admin_app, shutdown_rx.clone()));
        info!(addr = %admin_addr, "admin API listening");
    }

    // Wait for the OS signal, then tell every server to drain. The drain
    // timeout starts at signal receipt.
    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, futures_util::future::join_all(servers)).await {
        Ok(results) => {
            for result in results {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "server error during shutdown"),
                    Err(e) => error!(error = %e, "server task panicked"),
                }
            }
            info!("all in-flight requests drained");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn spawn_server(
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<()>,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    })
}

/// Health endpoint: pool summary plus uptime.
/// Returns 200 when at least one key is configured, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = state.pool.health().await;
    body["uptime_seconds"] = serde_json::json!(state.started_at.elapsed().as_secs());

    let status_code = if body["status"] == "healthy" {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
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
