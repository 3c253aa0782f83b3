//! Crate-wide error taxonomy
//!
//! Every public entry point in this crate returns a [`Result<T, RoofError>`](RoofError),
//! or a narrower alias when the call site can only fail in one way. No panic escapes the
//! core in non-test code; I/O failures are the only variant that propagates out of the
//! transport boundary unchanged.

use thiserror::Error;

/// Errors produced anywhere in the roof control core.
#[derive(Debug, Error)]
pub enum RoofError {
    /// The I2C transport failed the transaction. No retry is attempted at this layer.
    #[error("i2c transport error: {0}")]
    Io(#[from] IoError),

    /// A relay id, timeout, or interval in a
    /// [`RoofConfiguration`](crate::roof::config::RoofConfiguration) failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The command is illegal for the current [`Status`](crate::roof::Status), per the
    /// command acceptance matrix, or was rejected by the reentrancy guard.
    #[error("command rejected in current state: {0}")]
    CommandRejected(String),

    /// A safety invariant would have been violated (e.g. simultaneous Open and Close).
    #[error("safety violation: {0}")]
    SafetyViolation(String),

    /// A cancellation token fired during `clear_fault`, after the release-side write
    /// had already completed.
    #[error("operation cancelled")]
    CancellationRequested,

    /// `update_configuration` was attempted while the roof was moving or the watchdog
    /// was armed.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// A narrow error for the I2C transport boundary (C1), convertible into [`RoofError`].
#[derive(Debug, Error)]
pub enum IoError {
    /// The underlying bus transaction failed.
    #[error("bus transaction failed: {0}")]
    Transaction(String),

    /// A relay, channel, or register index was out of the valid range for the HAT.
    #[error("index {index} out of range, expected {min}..={max}")]
    IndexOutOfRange { index: u32, min: u32, max: u32 },
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = RoofError> = core::result::Result<T, E>;
