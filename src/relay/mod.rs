//! Relay command sequencer
//!
//! [`RelaySequencer`] is the only component allowed to drive the HAT's relay registers. It
//! atomically commands the `{Stop, Open, Close, ClearFault}` relays, enforcing that Open and
//! Close are never energized together and that direction relays are always switched before
//! (on the way up) or after (on the way down) the Stop master-enable relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument};

use crate::error::{Result, RoofError};
use crate::hat::FourRelayFourInputHat;
use crate::i2c::I2cTransport;
use crate::roof::config::RelayMapping;

/// The commanded relay tuple: `(stop, open, close)`.
pub type RelayTuple = (bool, bool, bool);

/// The always-safe idle tuple: everything de-energized.
pub const SAFE_TUPLE: RelayTuple = (false, false, false);

/// Drives the HAT's relays with fail-safe ordering and mutual-exclusion guards.
pub struct RelaySequencer<T> {
    hat: Arc<FourRelayFourInputHat<T>>,
    mapping: RelayMapping,
    last_commanded: AsyncMutex<Option<RelayTuple>>,
}

impl<T: I2cTransport + 'static> RelaySequencer<T> {
    /// Build a sequencer over `hat`, addressing relays per `mapping`.
    pub fn new(hat: Arc<FourRelayFourInputHat<T>>, mapping: RelayMapping) -> Self {
        RelaySequencer {
            hat,
            mapping,
            last_commanded: AsyncMutex::new(None),
        }
    }

    /// Atomically drive the relays to `(stop, open, close)`.
    ///
    /// A request with both `open` and `close` set is neutralized to the safe tuple before
    /// being applied (always a caller bug, logged at error level), and the call returns
    /// [`RoofError::SafetyViolation`] after the safe tuple has been written.
    ///
    /// Repeating the tuple currently in effect issues zero I2C writes.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_relay_states_atomically(
        &self,
        stop: bool,
        open: bool,
        close: bool,
    ) -> Result<()> {
        let violation = open && close;
        let (open, close) = if violation {
            error!("relay sequencer asked for simultaneous Open and Close; neutralizing");
            (false, false)
        } else {
            (open, close)
        };
        let target = (stop, open, close);

        let mut last = self.last_commanded.lock().await;
        if *last == Some(target) {
            return if violation {
                Err(RoofError::SafetyViolation(
                    "concurrent Open and Close requested".into(),
                ))
            } else {
                Ok(())
            };
        }

        if !open && !close {
            // Stop to safe: direction first, then the master-enable relay.
            self.hat.set_relay(self.mapping.open_relay_id, false).await?;
            self.hat.set_relay(self.mapping.close_relay_id, false).await?;
            self.hat.set_relay(self.mapping.stop_relay_id, false).await?;
        } else if open {
            // Begin Open: clear the opposite direction, then enable it and the master relay.
            self.hat.set_relay(self.mapping.close_relay_id, false).await?;
            self.hat.set_relay(self.mapping.open_relay_id, true).await?;
            self.hat.set_relay(self.mapping.stop_relay_id, stop).await?;
        } else {
            // Begin Close: symmetric to Begin Open.
            self.hat.set_relay(self.mapping.open_relay_id, false).await?;
            self.hat.set_relay(self.mapping.close_relay_id, true).await?;
            self.hat.set_relay(self.mapping.stop_relay_id, stop).await?;
        }

        *last = Some(target);
        drop(last);

        if violation {
            Err(RoofError::SafetyViolation(
                "concurrent Open and Close requested".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Energize the ClearFault relay for `pulse`, then release it.
    ///
    /// The release write always happens, even if `cancellation` fires mid-pulse; in that
    /// case the call returns [`RoofError::CancellationRequested`] only after the relay has
    /// been released.
    #[instrument(level = "debug", skip(self, cancellation))]
    pub async fn clear_fault(
        &self,
        pulse: Duration,
        cancellation: CancellationToken,
    ) -> Result<()> {
        self.hat
            .set_relay(self.mapping.clear_fault_relay_id, true)
            .await?;

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(pulse) => false,
            _ = cancellation.cancelled() => true,
        };

        self.hat
            .set_relay(self.mapping.clear_fault_relay_id, false)
            .await?;

        if cancelled {
            Err(RoofError::CancellationRequested)
        } else {
            Ok(())
        }
    }

    /// The relay tuple last successfully applied, if any.
    pub async fn last_commanded(&self) -> Option<RelayTuple> {
        *self.last_commanded.lock().await
    }
}
