use std::path::{Path, PathBuf};

use frame_capture_common::config::StorageConfig;
use frame_capture_common::frame::SessionTimestamp;

/// Fixed per-session metadata that, together with a batch timestamp, names
/// the directory a batch is written to.
#[derive(Debug, Clone)]
pub struct SessionLayout {
    base_dir: PathBuf,
    car_id: String,
    camera_name: String,
}

impl SessionLayout {
    pub fn new(base_dir: impl Into<PathBuf>, car_id: &str, camera_name: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            car_id: car_id.to_string(),
            camera_name: camera_name.to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.base_dir.clone(), &config.car_id, &config.camera_name)
    }

    /// Directory for one batch.
    /// e.g. "./dataCapture/Car0001/2024-03-09/07-05-03/camera01"
    pub fn batch_dir(&self, captured_at: &SessionTimestamp) -> PathBuf {
        self.base_dir
            .join("dataCapture")
            .join(format!("Car{}", self.car_id))
            .join(captured_at.date_component())
            .join(captured_at.time_component())
            .join(&self.camera_name)
    }

    /// e.g. "<batch_dir>/frame0.jpg"
    pub fn frame_path(dir: &Path, index: usize) -> PathBuf {
        dir.join(frame_file_name(index))
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame{index}.jpg")
}
