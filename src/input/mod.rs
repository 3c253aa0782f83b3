//! Digital input interpretation
//!
//! [`InputInterpreter`] turns the HAT's raw 4-bit input mask (IN1..IN4) into the four
//! logical sensors the roof state machine cares about (open limit, closed limit, fault,
//! and at-speed), applying normally-open/normally-closed polarity inversion and a
//! per-input debounce.
//!
//! Wiring convention: IN1 = open limit, IN2 = closed limit, IN3 = fault, IN4 = at-speed.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::time::Instant;

/// The four logical sensors derived from the raw input mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalInput {
    OpenLimit,
    ClosedLimit,
    Fault,
    AtSpeed,
}

/// A committed (post-debounce) logical edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorChange {
    pub input: LogicalInput,
    pub new_logical: bool,
}

/// The four logical sensors' currently committed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSnapshot {
    pub open_limit: bool,
    pub closed_limit: bool,
    pub fault: bool,
    pub at_speed: bool,
}

#[derive(Clone, Copy)]
struct ChannelState {
    last_observed_raw: bool,
    last_commit_time: Instant,
    committed_logical: bool,
}

const CHANNELS: [LogicalInput; 4] = [
    LogicalInput::OpenLimit,
    LogicalInput::ClosedLimit,
    LogicalInput::Fault,
    LogicalInput::AtSpeed,
];

/// Applies polarity inversion and debounce to the HAT's raw input mask.
pub struct InputInterpreter {
    use_normally_closed_limit_switches: bool,
    debounce: Duration,
    ignore_physical_limit_switches: bool,
    channels: StdMutex<[ChannelState; 4]>,
}

impl InputInterpreter {
    /// Build an interpreter with all four channels starting de-asserted.
    pub fn new(
        use_normally_closed_limit_switches: bool,
        debounce: Duration,
        ignore_physical_limit_switches: bool,
    ) -> Self {
        let initial = ChannelState {
            last_observed_raw: false,
            last_commit_time: Instant::now(),
            committed_logical: false,
        };
        InputInterpreter {
            use_normally_closed_limit_switches,
            debounce,
            ignore_physical_limit_switches,
            channels: StdMutex::new([initial; 4]),
        }
    }

    fn logical_from_raw(&self, input: LogicalInput, raw: bool) -> bool {
        match input {
            LogicalInput::OpenLimit | LogicalInput::ClosedLimit => {
                if self.use_normally_closed_limit_switches {
                    !raw
                } else {
                    raw
                }
            }
            LogicalInput::Fault | LogicalInput::AtSpeed => raw,
        }
    }

    fn raw_bit(mask: u8, channel_index: usize) -> bool {
        mask & (1 << channel_index) != 0
    }

    /// Directly commit the interpreter's state from a raw mask, bypassing debounce.
    ///
    /// Used once, at `Initialize`, to establish a baseline without spuriously firing edges.
    pub fn commit_initial(&self, mask: u8) -> SensorSnapshot {
        let now = Instant::now();
        let mut channels = self.channels.lock().unwrap();
        for (index, input) in CHANNELS.into_iter().enumerate() {
            let raw = Self::raw_bit(mask, index);
            let logical = self.logical_from_raw(input, raw);
            channels[index] = ChannelState {
                last_observed_raw: raw,
                last_commit_time: now,
                committed_logical: logical,
            };
        }
        drop(channels);
        self.snapshot()
    }

    /// Feed a freshly read raw input mask through polarity inversion and debounce,
    /// returning every logical edge that committed, in index order (open, closed, fault,
    /// at-speed).
    pub fn observe_raw_mask(&self, mask: u8) -> Vec<SensorChange> {
        let now = Instant::now();
        let mut changes = Vec::new();
        let mut channels = self.channels.lock().unwrap();
        for (index, input) in CHANNELS.into_iter().enumerate() {
            let raw = Self::raw_bit(mask, index);
            let state = &mut channels[index];
            if raw == state.last_observed_raw {
                continue;
            }
            state.last_observed_raw = raw;
            if now.saturating_duration_since(state.last_commit_time) < self.debounce {
                continue;
            }
            let logical = self.logical_from_raw(input, raw);
            if logical == state.committed_logical {
                continue;
            }
            state.committed_logical = logical;
            state.last_commit_time = now;
            changes.push(SensorChange {
                input,
                new_logical: logical,
            });
        }
        changes
    }

    /// The currently committed logical sensor state.
    ///
    /// When `ignore_physical_limit_switches` is set, both limits report de-asserted
    /// regardless of the committed hardware state; fault and at-speed are unaffected.
    pub fn snapshot(&self) -> SensorSnapshot {
        let channels = self.channels.lock().unwrap();
        let open_limit = channels[0].committed_logical;
        let closed_limit = channels[1].committed_logical;
        let fault = channels[2].committed_logical;
        let at_speed = channels[3].committed_logical;
        if self.ignore_physical_limit_switches {
            SensorSnapshot {
                open_limit: false,
                closed_limit: false,
                fault,
                at_speed,
            }
        } else {
            SensorSnapshot {
                open_limit,
                closed_limit,
                fault,
                at_speed,
            }
        }
    }
}
