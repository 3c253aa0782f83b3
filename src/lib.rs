//! Asynchronous roof control core
//!
//! `roof-hal` drives an observatory roof's motor contactor through a four-relay/four-input
//! Raspberry Pi HAT (a Sequent Microsystems SM4rel4in board) over I2C. It supervises the
//! relay sequencing, debounces the four digital sensor inputs (open limit, closed limit,
//! fault, at-speed), runs a safety watchdog and a periodic verifier, drives a status LED,
//! and exposes all of it through [`Controller`], the single type applications build against.
//!
//! # Transports
//!
//! The crate is generic over [`i2c::I2cTransport`]. [`i2c::transport::SimulatedTransport`]
//! is always available and is what the test suite exercises; the real
//! [`i2c::transport::RppalTransport`] sits behind the `hardware` feature so the crate builds
//! and tests on any host, not just a Raspberry Pi.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> roof_hal::error::Result<()> {
//! use roof_hal::controller::Controller;
//! use roof_hal::i2c::transport::SimulatedTransport;
//! use roof_hal::roof::config::RoofConfiguration;
//!
//! let controller = Controller::new(SimulatedTransport::new(), 0x21, RoofConfiguration::default())?;
//! controller.initialize().await?;
//! controller.open().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Module map
//!
//! - [`error`]: the crate's error taxonomy
//! - [`i2c`]: the register client and transport abstraction
//! - [`hat`]: the register-accurate HAT driver
//! - [`input`]: digital input polarity inversion and debounce
//! - [`relay`]: fail-safe relay sequencing
//! - [`roof`]: the status state machine and configuration model
//! - [`watchdog`]: the safety watchdog timer
//! - [`verifier`]: the periodic re-verification task
//! - [`led`]: the status LED indicator
//! - [`controller`]: the public API gluing everything together

pub mod controller;
pub mod error;
pub mod hat;
pub mod i2c;
pub mod input;
pub mod led;
pub mod relay;
pub mod roof;
pub mod verifier;
pub mod watchdog;

pub use controller::Controller;
pub use error::{IoError, Result, RoofError};
pub use roof::{Status, StatusChanged, StopReason};
