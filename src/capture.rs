use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;

/// Owns the external capture process. At most one child is alive at a time;
/// calling `start` with one running or `stop` without one is supervisor
/// misuse and surfaces as an error the caller treats as fatal.
pub struct CaptureSupervisor {
    command: String,
    args: Vec<String>,
    frame_dir: PathBuf,
    interval_secs: u64,
    restart_after: Duration,
    proc: Option<RunningCapture>,
}

struct RunningCapture {
    child: Child,
    started_at: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture process already running")]
    AlreadyRunning,
    #[error("no capture process to stop")]
    NotRunning,
    #[error("failed to clear frame directory {0}: {1}")]
    ClearFrames(String, std::io::Error),
    #[error("failed to spawn capture command {0}: {1}")]
    Spawn(String, std::io::Error),
    #[error("failed to kill capture process: {0}")]
    Kill(std::io::Error),
    #[error("failed to reap capture process: {0}")]
    Wait(std::io::Error),
}

impl CaptureSupervisor {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            frame_dir: config.frame_dir.clone(),
            interval_secs: config.interval_secs,
            restart_after: Duration::from_secs(config.restart_secs),
            proc: None,
        }
    }

    /// Spawn the capture process. The frame directory is wiped first so a
    /// previous run's frames can never be mistaken for fresh ones.
    ///
    /// The child runs with the frame directory as its working directory and
    /// receives the capture interval in seconds as its final argument.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        if self.proc.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }

        self.clear_frame_dir().await?;

        let child = Command::new(&self.command)
            .args(&self.args)
            .arg(self.interval_secs.to_string())
            .current_dir(&self.frame_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| CaptureError::Spawn(self.command.clone(), e))?;

        info!(
            command = self.command,
            interval_secs = self.interval_secs,
            frame_dir = %self.frame_dir.display(),
            "capture process started"
        );

        self.proc = Some(RunningCapture {
            child,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Kill the capture process immediately and reap it, so no zombie is
    /// left behind. No graceful-shutdown grace period: the capture binary
    /// holds no state worth flushing.
    pub async fn stop(&mut self) -> Result<(), CaptureError> {
        let mut running = self.proc.take().ok_or(CaptureError::NotRunning)?;
        running.child.kill().await.map_err(CaptureError::Kill)?;
        let status = running.child.wait().await.map_err(CaptureError::Wait)?;
        info!(uptime_secs = running.started_at.elapsed().as_secs(), %status, "capture process stopped");
        Ok(())
    }

    /// True once the running process has been up longer than the forced
    /// restart threshold. Always false while nothing is running.
    pub fn restart_due(&self) -> bool {
        self.proc
            .as_ref()
            .is_some_and(|p| p.started_at.elapsed() >= self.restart_after)
    }

    /// Unconditional stop/start cycle — the watchdog against capture
    /// processes that hang or leak without exiting.
    pub async fn restart(&mut self) -> Result<(), CaptureError> {
        warn!(
            threshold_secs = self.restart_after.as_secs(),
            "capture process exceeded restart threshold, forcing restart"
        );
        self.stop().await?;
        self.start().await
    }

    pub fn is_running(&self) -> bool {
        self.proc.is_some()
    }

    async fn clear_frame_dir(&self) -> Result<(), CaptureError> {
        let dir = self.frame_dir.display().to_string();
        let mut entries = tokio::fs::read_dir(&self.frame_dir)
            .await
            .map_err(|e| CaptureError::ClearFrames(dir.clone(), e))?;
        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CaptureError::ClearFrames(dir.clone(), e))?
        {
            tokio::fs::remove_file(entry.path())
                .await
                .map_err(|e| CaptureError::ClearFrames(dir.clone(), e))?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, frame_dir = %dir, "cleared stale frames");
        }
        Ok(())
    }
}
