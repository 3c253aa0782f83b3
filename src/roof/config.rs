//! Roof configuration
//!
//! [`RoofConfiguration`] is an immutable snapshot; [`Controller::update_configuration`]
//! (see [`crate::controller`]) replaces it atomically, and only when it is safe to do so.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoofError};

/// Which physical relay (1..4) drives each logical function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMapping {
    pub open_relay_id: u8,
    pub close_relay_id: u8,
    pub clear_fault_relay_id: u8,
    pub stop_relay_id: u8,
}

impl RelayMapping {
    /// The four default ids used by the reference HAT wiring.
    pub fn default_ids() -> Self {
        RelayMapping {
            open_relay_id: 1,
            close_relay_id: 2,
            clear_fault_relay_id: 3,
            stop_relay_id: 4,
        }
    }

    /// Validate that all four ids are in `1..=4` and pairwise distinct.
    pub fn validate(&self) -> Result<()> {
        let ids = [
            self.open_relay_id,
            self.close_relay_id,
            self.clear_fault_relay_id,
            self.stop_relay_id,
        ];
        for id in ids {
            if !(1..=4).contains(&id) {
                return Err(RoofError::InvalidConfiguration(format!(
                    "relay id {id} out of range 1..=4"
                )));
            }
        }
        let mut seen = ids;
        seen.sort_unstable();
        if seen.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(RoofError::InvalidConfiguration(format!(
                "relay ids must be pairwise distinct, got {ids:?}"
            )));
        }
        Ok(())
    }
}

impl Default for RelayMapping {
    fn default() -> Self {
        Self::default_ids()
    }
}

/// An immutable configuration snapshot for the roof controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoofConfiguration {
    pub relay_mapping: RelayMapping,
    pub use_normally_closed_limit_switches: bool,
    pub safety_watchdog_timeout: Duration,
    pub limit_switch_debounce: Duration,
    pub enable_digital_input_polling: bool,
    pub digital_input_poll_interval: Duration,
    pub enable_periodic_verification_while_moving: bool,
    pub periodic_verification_interval: Duration,
    pub ignore_physical_limit_switches: bool,
    pub post_transaction_delay: Duration,
}

impl RoofConfiguration {
    /// Validate every invariant from §3: distinct relay ids, and strictly positive
    /// timeout/poll/verification intervals where the spec requires it.
    pub fn validate(&self) -> Result<()> {
        self.relay_mapping.validate()?;
        if self.safety_watchdog_timeout.is_zero() {
            return Err(RoofError::InvalidConfiguration(
                "safety_watchdog_timeout must be greater than zero".into(),
            ));
        }
        if self.enable_digital_input_polling && self.digital_input_poll_interval.is_zero() {
            return Err(RoofError::InvalidConfiguration(
                "digital_input_poll_interval must be greater than zero when polling is enabled"
                    .into(),
            ));
        }
        if self.enable_periodic_verification_while_moving
            && self.periodic_verification_interval.is_zero()
        {
            return Err(RoofError::InvalidConfiguration(
                "periodic_verification_interval must be greater than zero when enabled".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RoofConfiguration {
    fn default() -> Self {
        RoofConfiguration {
            relay_mapping: RelayMapping::default_ids(),
            use_normally_closed_limit_switches: true,
            safety_watchdog_timeout: Duration::from_secs(60),
            limit_switch_debounce: Duration::from_millis(50),
            enable_digital_input_polling: true,
            digital_input_poll_interval: Duration::from_millis(100),
            enable_periodic_verification_while_moving: true,
            periodic_verification_interval: Duration::from_millis(500),
            ignore_physical_limit_switches: false,
            post_transaction_delay: crate::i2c::DEFAULT_POST_TRANSACTION_DELAY,
        }
    }
}
