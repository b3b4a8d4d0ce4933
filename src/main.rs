//! Veritas Resilience - background process
//!
//! Hosts the request scheduler with its cache and admission limiter and
//! serves the local admin/telemetry API.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use veritas_resilience::api::{create_router, AppState};
use veritas_resilience::cache::{flush_to, rehydrate_from};
use veritas_resilience::{spawn_cleanup_task, Config, FilePersistence};

/// # Startup Sequence
/// 1. Initialize tracing
/// 2. Load and validate configuration from environment variables
/// 3. Build the scheduler with its cache and limiter
/// 4. Rehydrate the cache when persistence is configured
/// 5. Start the expiry sweep
/// 6. Serve the admin API until SIGINT/SIGTERM, then flush the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veritas_resilience=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Veritas resilience layer");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        cache_max_size = config.cache.max_size,
        default_ttl_ms = config.cache.default_ttl.as_millis() as u64,
        batch_size = config.scheduler.batch_size,
        max_response_time_ms = config.scheduler.max_response_time.as_millis() as u64,
        port = config.server_port,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config);
    let cache = state.scheduler.cache().clone();

    let persistence = config.persistence_dir.clone().map(FilePersistence::new);
    if let Some(backend) = &persistence {
        match rehydrate_from(&cache, backend).await {
            Ok(restored) => info!(restored, dir = %backend.dir().display(), "Cache rehydrated"),
            Err(e) => warn!(error = %e, "Cache rehydration failed, starting cold"),
        }
    }

    let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);

    let app = create_router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Admin API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("server error")?;

    if let Some(backend) = &persistence {
        if let Err(e) = flush_to(&cache, backend).await {
            warn!(error = %e, "Failed to flush cache on shutdown");
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then stops the expiry sweep.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating shutdown"),
    }

    cleanup_handle.abort();
    warn!("Expiry sweep aborted");
}
