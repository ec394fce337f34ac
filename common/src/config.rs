use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
}

/// What happens to batches still queued when the session stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// The consumer keeps persisting queued batches until the queue is empty.
    #[default]
    Drain,
    /// Queued batches are abandoned as soon as the queue closes.
    Discard,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_pacing_interval_ms")]
    pub pacing_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// One of "synthetic", "snapshot" or "mjpeg".
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    #[serde(default = "default_car_id")]
    pub car_id: String,
    #[serde(default = "default_camera_name")]
    pub camera_name: String,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub on_error: PersistFailurePolicy,
}

/// How the consumer reacts when a batch cannot be persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistFailurePolicy {
    /// Stop the consumer and surface the error to the session.
    #[default]
    Abort,
    /// Log the failure, drop the batch and keep consuming.
    DropBatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            join_timeout_secs: default_join_timeout_secs(),
            shutdown_policy: ShutdownPolicy::default(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            pacing_interval_ms: default_pacing_interval_ms(),
            queue_capacity: default_queue_capacity(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            url: String::new(),
            width: default_width(),
            height: default_height(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            car_id: default_car_id(),
            camera_name: default_camera_name(),
            jpeg_quality: default_jpeg_quality(),
            write_timeout_ms: default_write_timeout_ms(),
            on_error: PersistFailurePolicy::default(),
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

impl SessionConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

impl CaptureConfig {
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl StorageConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.batch_size == 0 {
            return Err(ConfigError::Invalid("capture.batch_size must be > 0".into()));
        }
        if self.capture.queue_capacity == 0 {
            return Err(ConfigError::Invalid("capture.queue_capacity must be > 0".into()));
        }
        if self.capture.pacing_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture.pacing_interval_ms must be > 0".into(),
            ));
        }
        if self.storage.car_id.is_empty() {
            return Err(ConfigError::Invalid("storage.car_id must not be empty".into()));
        }
        if self.storage.camera_name.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.camera_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_duration_secs() -> u64 {
    10
}
fn default_join_timeout_secs() -> u64 {
    5
}
fn default_batch_size() -> usize {
    4
}
fn default_pacing_interval_ms() -> u64 {
    1000
}
fn default_queue_capacity() -> usize {
    16
}
fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_mode() -> String {
    "synthetic".into()
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_car_id() -> String {
    "0001".into()
}
fn default_camera_name() -> String {
    "camera01".into()
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_write_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}
