//! Register offsets for the four-relay/four-input HAT
//!
//! This map MUST match the Sequent Microsystems SM4rel4in board bit-for-bit; it is the
//! hardware contract the rest of the crate is built on.

/// Relay mask (bits 0..3 = relays 1..4). A direct write replaces the whole mask.
pub const RELAY_MASK: u8 = 0x00;
/// Write a relay index (1..4) here to set that relay's bit.
pub const RELAY_SET: u8 = 0x01;
/// Write a relay index (1..4) here to clear that relay's bit.
pub const RELAY_CLEAR: u8 = 0x02;
/// Digital input mask (bits 0..3 = IN1..IN4).
pub const DIGITAL_INPUT_MASK: u8 = 0x03;
/// AC input mask.
pub const AC_INPUT_MASK: u8 = 0x04;
/// LED value register.
pub const LED_VALUE: u8 = 0x05;
/// LED set register.
pub const LED_SET: u8 = 0x06;
/// LED clear register.
pub const LED_CLEAR: u8 = 0x07;
/// LED mode register.
pub const LED_MODE: u8 = 0x08;
/// Edge counter enable register.
pub const EDGE_COUNTER_ENABLE: u8 = 0x09;
/// Encoder enable register.
pub const ENCODER_ENABLE: u8 = 0x0A;
/// Base of the 4x u32 pulse counters (IN1..IN4), 4 bytes apart.
pub const PULSE_COUNTERS_BASE: u8 = 0x0D;
/// Base of the 4x u16 pulses-per-second registers, 2 bytes apart.
pub const PPS_BASE: u8 = 0x1D;
/// Base of the 2x i32 encoder counts, 4 bytes apart.
pub const ENCODER_COUNTS_BASE: u8 = 0x25;
/// Base of the 4x u16 PWM duty registers (percent * 100), 2 bytes apart.
pub const PWM_DUTY_BASE: u8 = 0x2D;
/// Base of the 4x u16 input frequency registers (Hz), 2 bytes apart.
pub const INPUT_FREQUENCY_BASE: u8 = 0x35;
/// Base of the 4x i16 current registers (mA, scale 1000), 2 bytes apart.
pub const CURRENT_BASE: u8 = 0x48;
/// Base of the 4x i16 RMS current registers, 2 bytes apart.
pub const RMS_CURRENT_BASE: u8 = 0x50;
/// Hardware revision major.
pub const HW_REVISION_MAJOR: u8 = 0x78;
/// Hardware revision minor.
pub const HW_REVISION_MINOR: u8 = 0x79;
/// Firmware revision major.
pub const FW_REVISION_MAJOR: u8 = 0x7A;
/// Firmware revision minor.
pub const FW_REVISION_MINOR: u8 = 0x7B;

/// Number of addressable registers the simulated transport needs to back.
pub const REGISTER_SPACE: usize = 0x7C;

/// Validate a 1-based relay or channel index against the HAT's 4 channels.
pub fn validate_channel(index: u8) -> Result<u8, crate::error::IoError> {
    if (1..=4).contains(&index) {
        Ok(index)
    } else {
        Err(crate::error::IoError::IndexOutOfRange {
            index: index as u32,
            min: 1,
            max: 4,
        })
    }
}
