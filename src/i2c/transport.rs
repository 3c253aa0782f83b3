//! I2C transport implementations
//!
//! Two capabilities implement [`I2cTransport`](super::I2cTransport): the production
//! [`RppalTransport`] (feature `hardware`, Linux/Raspberry Pi only) and the always-available
//! [`SimulatedTransport`] the test suite runs against.

use std::sync::{Arc, Mutex as StdMutex};

use crate::error::IoError;
use crate::hat::registers;

use super::I2cTransport;

/// Production transport backed by [`rppal::i2c::I2c`].
///
/// Reads and writes are plain SMBus-style block transfers: a register address byte
/// followed by the payload. This mirrors the driver's own framing in [`super::RegisterClient`];
/// `rppal` does not need to know about the HAT's register semantics.
#[cfg(feature = "hardware")]
pub struct RppalTransport {
    i2c: rppal::i2c::I2c,
}

#[cfg(feature = "hardware")]
impl RppalTransport {
    /// Open the given I2C bus and target the HAT at `address`.
    pub fn new(bus: u8, address: u8) -> Result<Self, IoError> {
        let mut i2c = rppal::i2c::I2c::with_bus(bus)
            .map_err(|e| IoError::Transaction(e.to_string()))?;
        i2c.set_slave_address(address as u16)
            .map_err(|e| IoError::Transaction(e.to_string()))?;
        Ok(RppalTransport { i2c })
    }
}

#[cfg(feature = "hardware")]
impl I2cTransport for RppalTransport {
    async fn read(&mut self, _address: u8, reg: u8, buf: &mut [u8]) -> Result<(), IoError> {
        self.i2c
            .write_read(&[reg], buf)
            .map_err(|e| IoError::Transaction(e.to_string()))
    }

    async fn write(&mut self, _address: u8, reg: u8, bytes: &[u8]) -> Result<(), IoError> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(bytes);
        self.i2c
            .write(&frame)
            .map_err(|e| IoError::Transaction(e.to_string()))?;
        Ok(())
    }
}

struct SimulatedState {
    registers: [u8; registers::REGISTER_SPACE],
    write_log: Vec<(u8, Vec<u8>)>,
}

impl SimulatedState {
    fn new() -> Self {
        SimulatedState {
            registers: [0u8; registers::REGISTER_SPACE],
            write_log: Vec::new(),
        }
    }
}

/// An in-memory stand-in for the HAT, replaying writes and honoring its command
/// semantics (SET/CLEAR relay registers mutate the mask register, not themselves) so the
/// whole core is testable without hardware.
///
/// Cloning shares the underlying state: keep one clone to hand to a
/// [`RegisterClient`](super::RegisterClient) and another to drive simulated sensor changes
/// and inspect the write log from a test.
#[derive(Clone)]
pub struct SimulatedTransport {
    state: Arc<StdMutex<SimulatedState>>,
}

impl SimulatedTransport {
    /// A fresh simulation with all registers zeroed.
    pub fn new() -> Self {
        SimulatedTransport {
            state: Arc::new(StdMutex::new(SimulatedState::new())),
        }
    }

    /// Directly set the digital input mask, as if the physical sensors changed.
    ///
    /// Bypasses the relay/LED command semantics; this is the only register real hardware
    /// would also drive asynchronously of any I2C write.
    pub fn set_input_mask(&self, mask: u8) {
        let mut state = self.state.lock().unwrap();
        state.registers[registers::DIGITAL_INPUT_MASK as usize] = mask;
    }

    /// The current relay mask, for test assertions.
    pub fn relay_mask(&self) -> u8 {
        let state = self.state.lock().unwrap();
        state.registers[registers::RELAY_MASK as usize]
    }

    /// The full transaction log `(register, bytes written)`, oldest first.
    pub fn write_log(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// Clear the transaction log without touching register state.
    pub fn clear_write_log(&self) {
        self.state.lock().unwrap().write_log.clear();
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl I2cTransport for SimulatedTransport {
    async fn read(&mut self, _address: u8, reg: u8, buf: &mut [u8]) -> Result<(), IoError> {
        let state = self.state.lock().unwrap();
        for (i, slot) in buf.iter_mut().enumerate() {
            let idx = reg as usize + i;
            *slot = *state.registers.get(idx).ok_or(IoError::IndexOutOfRange {
                index: idx as u32,
                min: 0,
                max: registers::REGISTER_SPACE as u32 - 1,
            })?;
        }
        Ok(())
    }

    async fn write(&mut self, _address: u8, reg: u8, bytes: &[u8]) -> Result<(), IoError> {
        let mut state = self.state.lock().unwrap();
        match reg {
            registers::RELAY_SET => {
                let relay = registers::validate_channel(bytes[0])?;
                state.registers[registers::RELAY_MASK as usize] |= 1 << (relay - 1);
            }
            registers::RELAY_CLEAR => {
                let relay = registers::validate_channel(bytes[0])?;
                state.registers[registers::RELAY_MASK as usize] &= !(1 << (relay - 1));
            }
            _ => {
                for (i, byte) in bytes.iter().enumerate() {
                    let idx = reg as usize + i;
                    let slot = state.registers.get_mut(idx).ok_or(IoError::IndexOutOfRange {
                        index: idx as u32,
                        min: 0,
                        max: registers::REGISTER_SPACE as u32 - 1,
                    })?;
                    *slot = *byte;
                }
            }
        }
        state.write_log.push((reg, bytes.to_vec()));
        Ok(())
    }
}
