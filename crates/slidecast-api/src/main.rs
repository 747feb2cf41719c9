//! Slidecast API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_api::{create_router, metrics, ApiConfig, AppState};
use slidecast_jobs::RetentionSweeper;
use slidecast_media::{check_ffmpeg, check_ffprobe};
use slidecast_worker::{OutputJanitor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting slidecast-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, work_dir={}",
        config.host,
        config.port,
        worker_config.work_dir.display()
    );

    match (check_ffmpeg(), check_ffprobe()) {
        (Ok(ffmpeg), Ok(_)) => info!("Using FFmpeg at {}", ffmpeg.display()),
        (Err(e), _) | (_, Err(e)) => warn!("{}; render jobs will fail until it is installed", e),
    }

    let output_dir = worker_config.output_dir();
    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?;

    match &worker_config.local_input_root {
        Some(root) => info!("Local input references allowed under {}", root.display()),
        None => info!("Local input references disabled; inputs must be http(s) URLs"),
    }

    let state = AppState::new(config.clone(), worker_config.clone());

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let sweeper = RetentionSweeper::new(
        state.renders.store(),
        worker_config.job_retention_chrono(),
        worker_config.sweep_interval,
    );
    tokio::spawn(async move { sweeper.run().await });

    let janitor = OutputJanitor::new(
        worker_config.work_dir.clone(),
        worker_config.output_retention,
        worker_config.janitor_interval,
        state.renders.store(),
    );
    tokio::spawn(async move { janitor.run().await });

    let renders = Arc::clone(&state.renders);
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    let active = renders.active_jobs();
    if active > 0 {
        warn!(active, "Shutting down with render jobs still running");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for development, JSON with `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("slidecast=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal");
}
