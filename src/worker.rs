use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::broadcast::FramePublisher;
use crate::capture::CaptureSupervisor;
use crate::frame::LatestFrame;
use crate::rotate::Rotator;

/// The dedicated background task driving the capture pipeline for the
/// lifetime of the process.
///
/// Every cycle: check the forced-restart watchdog, run one rotation pass,
/// and publish the frame if a new one appeared. The end-of-tick sleep adapts
/// to how long the work took, with a small floor so the loop keeps yielding
/// even when a tick overruns the interval.
///
/// Error policy: a tick that fails on frame I/O or the compression tool is
/// logged and skipped. Supervisor misuse and a failed forced restart are
/// fatal to the loop — at that point the capture binary is gone or the
/// program logic is wrong, and the process manager owns recovery.
pub async fn run_tick_loop(
    mut supervisor: CaptureSupervisor,
    mut rotator: Rotator,
    latest: Arc<LatestFrame>,
    publisher: FramePublisher,
    interval: Duration,
    min_sleep: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = supervisor.start().await {
        error!(error = %e, "failed to start capture process");
        return;
    }

    loop {
        let tick_start = Instant::now();

        if supervisor.restart_due() {
            if let Err(e) = supervisor.restart().await {
                error!(error = %e, "forced capture restart failed, stopping worker");
                break;
            }
        }

        match rotator.tick().await {
            Ok(Some(frame)) => {
                latest.store(frame.clone()).await;
                publisher.publish(&frame);
                debug!(bytes = frame.len(), "new frame published");
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "tick failed, skipping"),
        }

        let spent = tick_start.elapsed();
        let sleep_for = interval.saturating_sub(spent).max(min_sleep);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown too.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if supervisor.is_running() {
        if let Err(e) = supervisor.stop().await {
            warn!(error = %e, "failed to stop capture process on shutdown");
        }
    }
    info!("tick worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, CompressConfig};
    use tokio::time::timeout;

    fn pipeline(
        frame_dir: &std::path::Path,
    ) -> (CaptureSupervisor, Rotator, Arc<LatestFrame>, FramePublisher) {
        let capture = CaptureConfig {
            command: "sleep".into(),
            args: vec![],
            frame_dir: frame_dir.to_path_buf(),
            interval_secs: 30,
            restart_secs: 900,
        };
        let compress = CompressConfig {
            command: "true".into(),
            ..CompressConfig::default()
        };
        (
            CaptureSupervisor::new(&capture),
            Rotator::new(frame_dir.to_path_buf(), &compress),
            Arc::new(LatestFrame::new()),
            FramePublisher::new(),
        )
    }

    #[tokio::test]
    async fn frame_flows_from_store_to_broadcast_and_shutdown_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, rotator, latest, publisher) = pipeline(dir.path());
        let mut rx = publisher.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_tick_loop(
            supervisor,
            rotator,
            Arc::clone(&latest),
            publisher,
            Duration::from_millis(50),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        // Wait for start() to finish wiping the directory, then drop in a
        // frame the way the capture binary would.
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("0001.jpg"), b"catbytes").unwrap();

        let payload = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("frame should be broadcast within a couple of ticks")
            .unwrap();
        assert!(payload.starts_with("data:image/jpeg;base64,"));
        assert_eq!(
            latest.snapshot().await.unwrap(),
            bytes::Bytes::from_static(b"catbytes")
        );

        shutdown_tx.send(true).unwrap();
        timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should stop after shutdown signal")
            .unwrap();
    }

    #[tokio::test]
    async fn unchanged_frame_is_broadcast_once() {
        let dir = tempfile::tempdir().unwrap();
        let (supervisor, rotator, latest, publisher) = pipeline(dir.path());
        let mut rx = publisher.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_tick_loop(
            supervisor,
            rotator,
            latest,
            publisher,
            Duration::from_millis(50),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(dir.path().join("0001.jpg"), b"only").unwrap();

        timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();

        // Several more ticks pass with no new file: nothing further arrives.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
