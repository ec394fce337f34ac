pub mod coordinator;
pub mod session;
pub mod uplink;

use std::time::Duration;

use frame_capture_consumer::PersistError;
use frame_capture_producer::CaptureError;

pub use coordinator::{SessionPhase, ShutdownCoordinator, StopReason};
pub use session::{Session, SessionReport};
pub use uplink::{NoopUplink, Uplink};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("persistence failed: {0}")]
    Persist(#[from] PersistError),
    #[error("{worker} worker did not stop within {limit:?}")]
    JoinTimeout { worker: &'static str, limit: Duration },
    #[error("{worker} worker panicked: {reason}")]
    Panicked { worker: &'static str, reason: String },
}
