pub mod keys;
pub mod persist;
pub mod sink;

pub use keys::SessionLayout;
pub use persist::{PersistError, PersistStats, PersistenceConsumer};
pub use sink::{DiskSink, FrameSink, SinkError};
