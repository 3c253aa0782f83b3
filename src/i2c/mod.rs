//! I2C register client
//!
//! [`RegisterClient`] is the sole hardware boundary the rest of this crate depends on.
//! It performs byte/word/block register reads and writes against a device at a fixed
//! `(bus, address)`, serialized by a per-instance [`tokio::sync::Mutex`] so that two
//! callers never interleave a read-modify-write.
//!
//! The client is generic over an [`I2cTransport`], so the same driver code in
//! [`crate::hat`] runs against the production [`RppalTransport`](transport::RppalTransport)
//! (feature `hardware`) and the in-memory [`SimulatedTransport`](transport::SimulatedTransport)
//! used by the test suite.
//!
//! ```no_run
//! # async fn demo() -> roof_hal::error::Result<()> {
//! use roof_hal::i2c::{RegisterClient, transport::SimulatedTransport};
//!
//! let client = RegisterClient::new(SimulatedTransport::new(), 0x21);
//! client.write_u8(0x00, 0b0000_1001).await?;
//! let mask = client.read_u8(0x00).await?;
//! assert_eq!(mask, 0b0000_1001);
//! # Ok(())
//! # }
//! ```

pub mod transport;

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{IoError, Result};

/// The quiet interval enforced after every transaction by default.
///
/// Required by the Sequent Microsystems controller, which drops I2C ACKs on back-to-back
/// transactions otherwise.
pub const DEFAULT_POST_TRANSACTION_DELAY: Duration = Duration::from_millis(15);

/// A raw I2C transport: byte-level read/write against a device address.
///
/// Implementors do not need to know anything about the register map of the device they
/// talk to; [`RegisterClient`] layers register semantics (u8/u16/u32/block, little-endian)
/// on top of this.
pub trait I2cTransport: Send {
    /// Read `buf.len()` bytes starting at register `reg` into `buf`.
    fn read(
        &mut self,
        address: u8,
        reg: u8,
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<(), IoError>> + Send;

    /// Write `bytes` starting at register `reg`.
    fn write(
        &mut self,
        address: u8,
        reg: u8,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<(), IoError>> + Send;
}

/// Register-level client over an [`I2cTransport`], serialized by a per-instance mutex.
///
/// Every operation acquires the mutex for its full duration, issues exactly one
/// transport call, then sleeps for [`post_transaction_delay`](Self::post_transaction_delay)
/// before releasing the lock. No retries are attempted here; bus errors propagate as
/// [`IoError`].
pub struct RegisterClient<T> {
    transport: Mutex<T>,
    address: u8,
    post_transaction_delay: Duration,
}

impl<T: I2cTransport> RegisterClient<T> {
    /// Build a client for the device at `address`, using the default 15ms quiet interval.
    pub fn new(transport: T, address: u8) -> Self {
        Self::with_post_transaction_delay(transport, address, DEFAULT_POST_TRANSACTION_DELAY)
    }

    /// Build a client with an explicit post-transaction delay.
    pub fn with_post_transaction_delay(
        transport: T,
        address: u8,
        post_transaction_delay: Duration,
    ) -> Self {
        RegisterClient {
            transport: Mutex::new(transport),
            address,
            post_transaction_delay,
        }
    }

    /// The quiet interval this client sleeps after every transaction.
    pub fn post_transaction_delay(&self) -> Duration {
        self.post_transaction_delay
    }

    async fn settle(&self) {
        if !self.post_transaction_delay.is_zero() {
            tokio::time::sleep(self.post_transaction_delay).await;
        }
    }

    /// Read a single byte register.
    #[instrument(level = "trace", skip(self))]
    pub async fn read_u8(&self, reg: u8) -> Result<u8, IoError> {
        let mut buf = [0u8; 1];
        self.read_block(reg, &mut buf).await?;
        Ok(buf[0])
    }

    /// Read a little-endian 16-bit register.
    #[instrument(level = "trace", skip(self))]
    pub async fn read_u16(&self, reg: u8) -> Result<u16, IoError> {
        let mut buf = [0u8; 2];
        self.read_block(reg, &mut buf).await?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a little-endian 32-bit register.
    #[instrument(level = "trace", skip(self))]
    pub async fn read_u32(&self, reg: u8) -> Result<u32, IoError> {
        let mut buf = [0u8; 4];
        self.read_block(reg, &mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a block of `buf.len()` bytes starting at `reg`.
    #[instrument(level = "trace", skip(self, buf))]
    pub async fn read_block(&self, reg: u8, buf: &mut [u8]) -> Result<(), IoError> {
        let mut transport = self.transport.lock().await;
        let result = transport.read(self.address, reg, buf).await;
        drop(transport);
        self.settle().await;
        result
    }

    /// Write a single byte register.
    #[instrument(level = "trace", skip(self))]
    pub async fn write_u8(&self, reg: u8, value: u8) -> Result<(), IoError> {
        self.write_block(reg, &[value]).await
    }

    /// Write a little-endian 16-bit register.
    #[instrument(level = "trace", skip(self))]
    pub async fn write_u16(&self, reg: u8, value: u16) -> Result<(), IoError> {
        self.write_block(reg, &value.to_le_bytes()).await
    }

    /// Write a block of bytes starting at `reg`.
    #[instrument(level = "trace", skip(self, bytes))]
    pub async fn write_block(&self, reg: u8, bytes: &[u8]) -> Result<(), IoError> {
        let mut transport = self.transport.lock().await;
        let result = transport.write(self.address, reg, bytes).await;
        drop(transport);
        self.settle().await;
        result
    }
}
