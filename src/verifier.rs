//! Periodic verifier
//!
//! A background task that force-reads the digital inputs on a fixed interval while the roof
//! is moving, independently of the edge-driven poll in [`crate::controller`]. It exists to
//! catch a missed or suppressed edge on that primary path: the second line of defense
//! behind limit-switch interrupts/polling, not the primary signal.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::controller::Controller;
use crate::i2c::I2cTransport;

/// Spawn the periodic verifier task. Each tick is a no-op unless the roof is currently
/// `Opening` or `Closing`.
pub fn spawn_periodic_verifier<T: I2cTransport + 'static>(
    controller: Arc<Controller<T>>,
    interval: Duration,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = ticker.tick() => {
                    if controller.status_snapshot().await.status.is_moving() {
                        if let Err(error) = controller.force_refresh().await {
                            warn!(%error, "periodic verifier refresh failed");
                        }
                    }
                }
            }
        }
    })
}
