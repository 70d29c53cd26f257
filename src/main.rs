mod broadcast;
mod capture;
mod config;
mod frame;
mod rotate;
mod web;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use broadcast::FramePublisher;
use capture::CaptureSupervisor;
use chrono::Utc;
use config::Config;
use frame::LatestFrame;
use rotate::Rotator;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        command = config.capture.command,
        frame_dir = %config.capture.frame_dir.display(),
        interval_secs = config.capture.interval_secs,
        restart_secs = config.capture.restart_secs,
        started_at = %Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        "starting catcam"
    );

    // The frame directory is the rendezvous point with the capture process;
    // without it nothing else can work.
    if let Err(e) = std::fs::create_dir_all(&config.capture.frame_dir) {
        error!(
            error = %e,
            frame_dir = %config.capture.frame_dir.display(),
            "frame directory is not usable"
        );
        std::process::exit(1);
    }

    check_compress_available(&config.compress.command).await;

    let latest = Arc::new(LatestFrame::new());
    let publisher = FramePublisher::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let supervisor = CaptureSupervisor::new(&config.capture);
    let rotator = Rotator::new(config.capture.frame_dir.clone(), &config.compress);

    let worker = tokio::spawn(worker::run_tick_loop(
        supervisor,
        rotator,
        Arc::clone(&latest),
        publisher.clone(),
        Duration::from_secs(config.capture.interval_secs),
        Duration::from_millis(config.worker.min_sleep_ms),
        shutdown_rx,
    ));

    let state = Arc::new(web::AppState { latest, publisher });
    let app = web::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr, "catcam server starting");

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
    }

    // Let the in-flight tick finish, then stop the capture process.
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        warn!(error = %e, "tick worker did not shut down cleanly");
    }
    info!("catcam stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}

/// Check whether the compression tool is available on PATH. Logs a warning
/// if not found; every tick with a new frame will fail until it is installed.
async fn check_compress_available(command: &str) {
    match Command::new(command).arg("-version").output().await {
        Ok(out) if out.status.success() => {
            debug!(command, "compression tool is available");
        }
        Ok(_) => {
            warn!(command, "compression tool returned non-zero for -version; compression may fail");
        }
        Err(e) => {
            warn!(
                error = %e,
                command,
                "compression tool not found on PATH; frames cannot be compressed until it is installed"
            );
        }
    }
}
