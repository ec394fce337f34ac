use frame_capture_common::config::Config;
use frame_capture_consumer::DiskSink;
use frame_capture_producer::build_source;
use frame_capture_session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

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
        mode = config.source.mode,
        base_dir = %config.storage.base_dir.display(),
        car_id = config.storage.car_id,
        camera = config.storage.camera_name,
        "starting frame-capture"
    );

    let source = match build_source(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to set up frame source");
            std::process::exit(1);
        }
    };
    let sink = Arc::new(DiskSink::new(config.storage.jpeg_quality));

    match Session::new(config, source, sink).stop_on_ctrl_c().run().await {
        Ok(report) => {
            info!(
                reason = %report.reason,
                batches = report.persist.batches,
                frames = report.persist.frames,
                "done"
            );
        }
        Err(e) => {
            error!(error = %e, "session failed");
            std::process::exit(1);
        }
    }
}
