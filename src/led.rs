//! Status LED indicator
//!
//! Mirrors the committed sensor snapshot onto the HAT's LED bank: bit 0 = open limit, bit 1
//! = closed limit, bit 2 = fault, bit 3 is reserved and always low.

use std::sync::Arc;

use tracing::instrument;

use crate::error::Result;
use crate::hat::FourRelayFourInputHat;
use crate::i2c::I2cTransport;
use crate::input::SensorSnapshot;

/// Compute the 4-bit LED mask for a sensor snapshot.
pub fn led_mask(snapshot: SensorSnapshot) -> u8 {
    let mut mask = 0u8;
    if snapshot.open_limit {
        mask |= 1 << 0;
    }
    if snapshot.closed_limit {
        mask |= 1 << 1;
    }
    if snapshot.fault {
        mask |= 1 << 2;
    }
    mask
}

/// Drives the HAT's LED bank from sensor snapshots.
pub struct StatusLed<T> {
    hat: Arc<FourRelayFourInputHat<T>>,
}

impl<T: I2cTransport + 'static> StatusLed<T> {
    pub fn new(hat: Arc<FourRelayFourInputHat<T>>) -> Self {
        StatusLed { hat }
    }

    /// Push the LED mask for `snapshot` to hardware.
    #[instrument(level = "trace", skip(self))]
    pub async fn apply(&self, snapshot: SensorSnapshot) -> Result<()> {
        self.hat.set_led_mask(led_mask(snapshot)).await
    }
}
