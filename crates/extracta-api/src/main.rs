//! extracta-api - HTTP server for the extracta job engine.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use extracta_api::{router, AppState, ServerConfig};
use extracta_core::defaults::SHUTDOWN_GRACE_SECS;
use extracta_jobs::{
    EncoderConfig, FfmpegAdapter, JobOrchestrator, OrchestratorConfig, ReaperConfig, StageAdapter,
    TranscriberConfig, WhisperAdapter,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _file_guard = init_tracing();

    let server = ServerConfig::from_env();
    let orchestrator_config = OrchestratorConfig::from_env();
    let reaper_config = ReaperConfig::from_env();

    tokio::fs::create_dir_all(&server.uploads_dir).await?;
    tokio::fs::create_dir_all(&orchestrator_config.outputs_dir).await?;

    let extractor: Arc<dyn StageAdapter> = Arc::new(FfmpegAdapter::new(EncoderConfig::from_env()));
    let transcriber: Arc<dyn StageAdapter> =
        Arc::new(WhisperAdapter::new(TranscriberConfig::from_env()));
    for adapter in [&extractor, &transcriber] {
        match adapter.health_check().await {
            Ok(true) => info!(tool = adapter.name(), stage = %adapter.stage(), "Adapter ready"),
            Ok(false) => warn!(
                tool = adapter.name(),
                stage = %adapter.stage(),
                "Adapter unavailable, its stage will fail until it is installed"
            ),
            Err(e) => warn!(tool = adapter.name(), error = %e, "Adapter health check failed"),
        }
    }

    let orchestrator = Arc::new(JobOrchestrator::new(
        orchestrator_config,
        extractor,
        transcriber,
    )?);
    let reaper = orchestrator.spawn_reaper(reaper_config);

    let addr = server.socket_addr()?;
    let app = router(AppState::new(orchestrator.clone(), server));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = orchestrator.shutdown_token();
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .into_future();

    tokio::select! {
        result = serve => result?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
        } => warn!(grace_secs = SHUTDOWN_GRACE_SECS, "Open connections did not drain in time"),
    }

    orchestrator.shutdown().await;
    if let Some(handle) = reaper {
        let _ = handle.await;
    }

    info!("Server stopped");
    Ok(())
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter
///                 (default: "extracta_api=debug,extracta_jobs=debug,tower_http=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "extracta_api=debug,extracta_jobs=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("extracta-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolve on SIGINT or SIGTERM and cancel every job-engine task.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    shutdown.cancel();
}
