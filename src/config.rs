use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub compress: CompressConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Capture binary. It must drop one frame file into `frame_dir` roughly
    /// every `interval_secs`, named so that lexicographic order equals
    /// capture-time order.
    #[serde(default = "default_capture_command")]
    pub command: String,
    /// Arguments placed before the interval value on the command line.
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    #[serde(default = "default_frame_dir")]
    pub frame_dir: PathBuf,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Forced-restart watchdog threshold for the capture process.
    #[serde(default = "default_restart")]
    pub restart_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompressConfig {
    #[serde(default = "default_compress_command")]
    pub command: String,
    /// JPEG quality percentage passed to the compression tool.
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_blur")]
    pub blur: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Minimum end-of-tick sleep, so the loop always yields under overload.
    #[serde(default = "default_min_sleep_ms")]
    pub min_sleep_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            command: default_compress_command(),
            quality: default_quality(),
            blur: default_blur(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            min_sleep_ms: default_min_sleep_ms(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_capture_command() -> String {
    "imagesnap".into()
}
fn default_capture_args() -> Vec<String> {
    vec!["-t".into()]
}
fn default_frame_dir() -> PathBuf {
    "images".into()
}
fn default_interval() -> u64 {
    2
}
fn default_restart() -> u64 {
    15 * 60
}
fn default_compress_command() -> String {
    "convert".into()
}
fn default_quality() -> u32 {
    50
}
fn default_blur() -> f64 {
    0.05
}
fn default_min_sleep_ms() -> u64 {
    200
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str("[capture]\n").unwrap();
        assert_eq!(config.capture.command, "imagesnap");
        assert_eq!(config.capture.args, vec!["-t".to_string()]);
        assert_eq!(config.capture.frame_dir, PathBuf::from("images"));
        assert_eq!(config.capture.interval_secs, 2);
        assert_eq!(config.capture.restart_secs, 900);
        assert_eq!(config.compress.command, "convert");
        assert_eq!(config.compress.quality, 50);
        assert_eq!(config.worker.min_sleep_ms, 200);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
            [capture]
            command = "fswebcam"
            args = []
            frame_dir = "/var/lib/catcam/frames"
            interval_secs = 5
            restart_secs = 600

            [compress]
            quality = 70

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.capture.command, "fswebcam");
        assert!(config.capture.args.is_empty());
        assert_eq!(config.capture.interval_secs, 5);
        assert_eq!(config.compress.quality, 70);
        assert_eq!(config.compress.blur, 0.05);
        assert_eq!(config.server.port, 8080);
    }
}
