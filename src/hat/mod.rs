//! Four-relay/four-input HAT driver
//!
//! [`FourRelayFourInputHat`] is a register-accurate driver for the Sequent Microsystems
//! SM4rel4in board: relay set/clear/mask, digital input mask read, edge-event synthesis,
//! LED mask control, and revision query. It is generic over the [`I2cTransport`] its
//! [`RegisterClient`] was built with, so the same driver runs against real hardware or the
//! [`SimulatedTransport`](crate::i2c::transport::SimulatedTransport).
//!
//! Every high-level operation here acquires the client's mutex for the full duration of its
//! read-modify-write; `set_relay` specifically goes through the SET/CLEAR registers rather
//! than a mask write, so peer relays are undisturbed.

pub mod registers;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, trace, warn};

use crate::error::Result;
use crate::i2c::{I2cTransport, RegisterClient};

/// A single digital input's raw level changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputChange {
    /// 1-based input channel (1..4).
    pub input: u8,
    /// The new raw level: `true` = HIGH, `false` = LOW.
    pub level: bool,
}

/// Register-accurate driver for the four-relay/four-input HAT.
pub struct FourRelayFourInputHat<T> {
    client: Arc<RegisterClient<T>>,
    last_input_mask: AtomicU8,
    changes: broadcast::Sender<InputChange>,
}

impl<T: I2cTransport + 'static> FourRelayFourInputHat<T> {
    /// Wrap a register client as a HAT driver.
    pub fn new(client: Arc<RegisterClient<T>>) -> Self {
        let (changes, _rx) = broadcast::channel(32);
        FourRelayFourInputHat {
            client,
            last_input_mask: AtomicU8::new(0),
            changes,
        }
    }

    /// Subscribe to per-input raw level changes, in index order.
    pub fn input_changes(&self) -> broadcast::Receiver<InputChange> {
        self.changes.subscribe()
    }

    /// Energize (`on = true`) or de-energize a single relay (1..4) via the SET/CLEAR
    /// registers, leaving the other three relays untouched.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_relay(&self, relay: u8, on: bool) -> Result<()> {
        let relay = registers::validate_channel(relay)?;
        let reg = if on {
            registers::RELAY_SET
        } else {
            registers::RELAY_CLEAR
        };
        self.client.write_u8(reg, relay).await?;
        Ok(())
    }

    /// Replace the full 4-bit relay mask in a single I2C write.
    #[instrument(level = "debug", skip(self))]
    pub async fn set_relays_mask(&self, mask: u8) -> Result<()> {
        self.client.write_u8(registers::RELAY_MASK, mask & 0x0F).await?;
        Ok(())
    }

    /// Read the current 4-bit relay mask.
    pub async fn relays_mask(&self) -> Result<u8> {
        Ok(self.client.read_u8(registers::RELAY_MASK).await? & 0x0F)
    }

    /// Read the 4-bit digital input mask (bits 0..3 = IN1..IN4).
    #[instrument(level = "trace", skip(self))]
    pub async fn read_inputs(&self) -> Result<u8> {
        let mask = self.client.read_u8(registers::DIGITAL_INPUT_MASK).await? & 0x0F;
        self.note_input_mask(mask);
        Ok(mask)
    }

    /// Set the LED mask (bit 0 = LED1, .. bit 3 = LED4 / reserved).
    #[instrument(level = "debug", skip(self))]
    pub async fn set_led_mask(&self, mask: u8) -> Result<()> {
        self.client.write_u8(registers::LED_VALUE, mask & 0x0F).await?;
        Ok(())
    }

    /// Read the hardware/firmware revision as `(major, minor)`.
    pub async fn hardware_revision(&self) -> Result<(u8, u8)> {
        let major = self.client.read_u8(registers::HW_REVISION_MAJOR).await?;
        let minor = self.client.read_u8(registers::HW_REVISION_MINOR).await?;
        Ok((major, minor))
    }

    /// Read a channel's pulse counter (1..4).
    pub async fn pulse_counter(&self, channel: u8) -> Result<u32> {
        let channel = registers::validate_channel(channel)?;
        let reg = registers::PULSE_COUNTERS_BASE + (channel - 1) * 4;
        Ok(self.client.read_u32(reg).await?)
    }

    /// Fires an [`InputChange`] for each bit that differs between the last observed mask
    /// and `mask`, in index order, and stores `mask` as the new baseline.
    fn note_input_mask(&self, mask: u8) {
        let previous = self.last_input_mask.swap(mask, Ordering::SeqCst);
        let changed = previous ^ mask;
        if changed == 0 {
            return;
        }
        for input in 1..=4u8 {
            let bit = 1 << (input - 1);
            if changed & bit != 0 {
                let level = mask & bit != 0;
                trace!(input, level, "digital input changed");
                // No subscribers is routine (nobody has called input_changes() yet).
                let _ = self.changes.send(InputChange { input, level });
            }
        }
    }

    /// Spawn a cooperative task that polls [`read_inputs`](Self::read_inputs) every
    /// `interval` and fires [`InputChange`] events for whatever changed, until
    /// `cancellation` is triggered.
    pub fn spawn_input_poller(
        self: &Arc<Self>,
        interval: Duration,
        cancellation: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let hat = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = hat.read_inputs().await {
                            warn!(%error, "digital input poll failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::transport::SimulatedTransport;

    #[tokio::test]
    async fn read_inputs_fires_input_change_events_in_index_order() {
        let transport = SimulatedTransport::new();
        let client = Arc::new(RegisterClient::new(transport.clone(), 0x21));
        let hat = Arc::new(FourRelayFourInputHat::new(client));
        let mut changes = hat.input_changes();

        transport.set_input_mask(0b0000);
        hat.read_inputs().await.unwrap();

        transport.set_input_mask(0b0101);
        hat.read_inputs().await.unwrap();

        assert_eq!(
            changes.try_recv().unwrap(),
            InputChange { input: 1, level: true }
        );
        assert_eq!(
            changes.try_recv().unwrap(),
            InputChange { input: 3, level: true }
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_inputs_fires_no_event_when_mask_is_unchanged() {
        let transport = SimulatedTransport::new();
        let client = Arc::new(RegisterClient::new(transport.clone(), 0x21));
        let hat = Arc::new(FourRelayFourInputHat::new(client));
        let mut changes = hat.input_changes();

        transport.set_input_mask(0b0010);
        hat.read_inputs().await.unwrap();
        changes.try_recv().unwrap();

        hat.read_inputs().await.unwrap();
        assert!(changes.try_recv().is_err());
    }
}
