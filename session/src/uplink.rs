use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Network-send stage running alongside capture and persistence.
///
/// The session spawns it as its own task and only joins it at shutdown, so an
/// implementation can never stall the producer or the consumer.
pub trait Uplink: Send + 'static {
    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "uplink"
    }

    fn run(self: Box<Self>, cancel: CancellationToken) -> BoxFuture<'static, ()>;
}

/// Placeholder uplink: returns as soon as it is started.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUplink;

impl Uplink for NoopUplink {
    fn name(&self) -> &str {
        "noop"
    }

    fn run(self: Box<Self>, _cancel: CancellationToken) -> BoxFuture<'static, ()> {
        Box::pin(async {
            debug!("uplink stub started, nothing to send");
        })
    }
}
