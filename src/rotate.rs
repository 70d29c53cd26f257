use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::CompressConfig;

/// Per-tick frame-store pass: keep only the newest frame file, compress it
/// in place exactly once, and hand its bytes back for publishing.
///
/// Frame files must be named so that lexicographic order equals capture-time
/// order — that is the contract with the capture binary, and the only
/// ordering this engine consults.
pub struct Rotator {
    frame_dir: PathBuf,
    compress: CompressConfig,
    /// Path of the frame most recently compressed. Compression is
    /// destructive, so a frame that survives several ticks must not be
    /// re-compressed: quality would degrade without bound.
    last_compressed: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RotateError {
    #[error("failed to list frame directory {0}: {1}")]
    List(String, std::io::Error),
    #[error("failed to delete stale frame {0}: {1}")]
    Delete(String, std::io::Error),
    #[error("failed to run compress command {0}: {1}")]
    CompressSpawn(String, std::io::Error),
    #[error("compress command exited with {0}")]
    CompressFailed(std::process::ExitStatus),
    #[error("failed to read frame {0}: {1}")]
    Read(String, std::io::Error),
}

impl Rotator {
    pub fn new(frame_dir: PathBuf, compress: &CompressConfig) -> Self {
        Self {
            frame_dir,
            compress: compress.clone(),
            last_compressed: None,
        }
    }

    /// One rotation pass. Returns the newest frame's bytes when a frame was
    /// newly compressed this tick, `None` when the store is empty or the
    /// newest file is unchanged since the last pass.
    pub async fn tick(&mut self) -> Result<Option<Bytes>, RotateError> {
        let mut names = self.list_frames().await?;
        names.sort();

        let Some((newest, stale)) = names.split_last() else {
            return Ok(None);
        };
        for name in stale {
            let path = self.frame_dir.join(name);
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| RotateError::Delete(path.display().to_string(), e))?;
        }
        if !stale.is_empty() {
            debug!(deleted = stale.len(), newest, "rotated frame directory");
        }

        let newest_path = self.frame_dir.join(newest);
        if self.last_compressed.as_deref() == Some(newest_path.as_path()) {
            // Capture is running slow; the frame we already published is
            // still the newest. Nothing to do.
            return Ok(None);
        }
        if let Some(last) = &self.last_compressed {
            if newest_path < *last {
                warn!(
                    newest,
                    previous = %last.display(),
                    "capture naming broke chronological order, publishing anyway"
                );
            }
        }

        self.compress_in_place(&newest_path).await?;
        self.last_compressed = Some(newest_path.clone());

        let bytes = tokio::fs::read(&newest_path)
            .await
            .map_err(|e| RotateError::Read(newest_path.display().to_string(), e))?;
        Ok(Some(Bytes::from(bytes)))
    }

    async fn list_frames(&self) -> Result<Vec<String>, RotateError> {
        let dir = self.frame_dir.display().to_string();
        let mut entries = tokio::fs::read_dir(&self.frame_dir)
            .await
            .map_err(|e| RotateError::List(dir.clone(), e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RotateError::List(dir.clone(), e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Shrink the frame in place: strip metadata, interlace for progressive
    /// loading, blur slightly to help the encoder, and drop the quality.
    /// Input and output path are the same, which is what makes the
    /// `last_compressed` guard above load-bearing.
    async fn compress_in_place(&self, path: &Path) -> Result<(), RotateError> {
        let blur = self.compress.blur.to_string();
        let quality = format!("{}%", self.compress.quality);
        let status = Command::new(&self.compress.command)
            .arg("-strip")
            .args(["-interlace", "Plane"])
            .args(["-gaussian-blur", &blur])
            .args(["-quality", &quality])
            .arg(path)
            .arg(path)
            .status()
            .await
            .map_err(|e| RotateError::CompressSpawn(self.compress.command.clone(), e))?;

        if !status.success() {
            return Err(RotateError::CompressFailed(status));
        }
        debug!(path = %path.display(), quality = self.compress.quality, "compressed frame");
        Ok(())
    }
}
