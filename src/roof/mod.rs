//! Roof status state machine
//!
//! [`RoofStateMachine`] is pure, synchronous decision logic: given the currently committed
//! [`Status`] and an incoming command, sensor snapshot, or watchdog expiry, it decides the
//! next status and what the caller ([`crate::controller::Controller`]) must do about it,
//! without touching hardware, a clock, or a lock itself. That orchestration lives one layer
//! up, in the controller, which is what lets this module be tested with plain unit tests.

pub mod config;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoofError};
use crate::input::SensorSnapshot;
use crate::relay::{RelayTuple, SAFE_TUPLE};

/// The roof's observable status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NotInitialized,
    Unknown,
    Stopped,
    Opening,
    Closing,
    Open,
    Closed,
    PartiallyOpen,
    PartiallyClose,
    Error,
}

impl Status {
    /// Whether the roof is actively driving a direction relay.
    pub fn is_moving(self) -> bool {
        matches!(self, Status::Opening | Status::Closing)
    }
}

/// Why the roof last stopped (or why a command was rejected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    None,
    NormalStop,
    LimitSwitchReached,
    SafetyWatchdogTimeout,
    EmergencyStop,
    FaultDetected,
    SystemShutdown,
    BothLimitsActive,
    CommandRejected,
}

/// A command entering the state machine from the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Open,
    Close,
    Stop(StopReason),
    ClearFault,
}

/// What the caller must do in response to an accepted command or sensor/timer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The event is idempotent with the current state: no relay writes, no watchdog
    /// rearm, no new `StatusChanged` notification.
    NoOp,
    /// Drive the relays to `relays` and commit `status`.
    Drive {
        relays: RelayTuple,
        status: Status,
        arm_watchdog: bool,
        cancel_watchdog: bool,
    },
    /// Pulse the ClearFault relay; the state remains `Error` until the caller reports
    /// back with [`RoofStateMachine::on_clear_fault_pulsed`].
    PulseClearFault,
    /// The roof recovered out of `Error` back to a normal status; relays are already safe.
    Recovered { status: Status },
}

fn rejected(message: impl Into<String>) -> RoofError {
    RoofError::CommandRejected(message.into())
}

fn status_for_snapshot(snapshot: SensorSnapshot) -> (Status, StopReason) {
    if snapshot.open_limit && snapshot.closed_limit {
        (Status::Error, StopReason::BothLimitsActive)
    } else if snapshot.fault {
        (Status::Error, StopReason::FaultDetected)
    } else if snapshot.open_limit {
        (Status::Open, StopReason::None)
    } else if snapshot.closed_limit {
        (Status::Closed, StopReason::None)
    } else {
        (Status::Stopped, StopReason::None)
    }
}

/// Pure state: status, last stop reason, and whether a `ClearFault` pulse is outstanding.
#[derive(Debug, Clone, Copy)]
pub struct RoofStateMachine {
    status: Status,
    last_stop_reason: StopReason,
    clear_fault_armed: bool,
}

impl RoofStateMachine {
    /// A freshly constructed machine, before `Initialize` has run.
    pub fn new() -> Self {
        RoofStateMachine {
            status: Status::NotInitialized,
            last_stop_reason: StopReason::None,
            clear_fault_armed: false,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn last_stop_reason(&self) -> StopReason {
        self.last_stop_reason
    }

    fn commit(&mut self, status: Status, reason: StopReason) {
        self.status = status;
        self.last_stop_reason = reason;
    }

    /// Commit the initial status from a freshly read sensor snapshot, per §4.5's
    /// initialization rule. Always discards any prior partial-travel state.
    pub fn initialize(&mut self, snapshot: SensorSnapshot) -> (Status, StopReason) {
        let (status, reason) = status_for_snapshot(snapshot);
        self.clear_fault_armed = false;
        self.commit(status, reason);
        (status, reason)
    }

    /// Apply a command per the command acceptance matrix (§4.5), returning the action the
    /// caller must perform, or `CommandRejected` for a matrix violation (no mutation).
    pub fn dispatch_command(&mut self, command: Command) -> Result<Action> {
        use Status::*;
        match command {
            Command::Open => match self.status {
                NotInitialized | Unknown => Err(rejected("Open rejected: not initialized")),
                Opening => Ok(Action::NoOp),
                Closing | Open | Error => {
                    Err(rejected(format!("Open rejected from {:?}", self.status)))
                }
                Stopped | PartiallyOpen | PartiallyClose | Closed => {
                    self.commit(Opening, StopReason::None);
                    Ok(Action::Drive {
                        relays: (true, true, false),
                        status: Opening,
                        arm_watchdog: true,
                        cancel_watchdog: false,
                    })
                }
            },
            Command::Close => match self.status {
                NotInitialized | Unknown => Err(rejected("Close rejected: not initialized")),
                Closing => Ok(Action::NoOp),
                Opening | Closed | Error => {
                    Err(rejected(format!("Close rejected from {:?}", self.status)))
                }
                Stopped | PartiallyOpen | PartiallyClose | Open => {
                    self.commit(Closing, StopReason::None);
                    Ok(Action::Drive {
                        relays: (true, false, true),
                        status: Closing,
                        arm_watchdog: true,
                        cancel_watchdog: false,
                    })
                }
            },
            Command::Stop(reason) => match self.status {
                NotInitialized | Unknown => Err(rejected("Stop rejected: not initialized")),
                Stopped | PartiallyOpen | PartiallyClose | Open | Closed | Error => {
                    Ok(Action::NoOp)
                }
                Opening => {
                    self.commit(PartiallyOpen, reason);
                    Ok(Action::Drive {
                        relays: SAFE_TUPLE,
                        status: PartiallyOpen,
                        arm_watchdog: false,
                        cancel_watchdog: true,
                    })
                }
                Closing => {
                    self.commit(PartiallyClose, reason);
                    Ok(Action::Drive {
                        relays: SAFE_TUPLE,
                        status: PartiallyClose,
                        arm_watchdog: false,
                        cancel_watchdog: true,
                    })
                }
            },
            Command::ClearFault => match self.status {
                Error => Ok(Action::PulseClearFault),
                _ => Err(rejected("ClearFault rejected: no fault latched")),
            },
        }
    }

    /// Feed a freshly committed sensor snapshot from [`crate::input::InputInterpreter`]
    /// through the limit-reached / fault / both-limits rules (§4.5), returning the action
    /// to perform, if any. Used both for edge-driven updates and for
    /// [`crate::verifier`]'s periodic re-read.
    pub fn on_sensor_snapshot(&mut self, snapshot: SensorSnapshot) -> Option<Action> {
        if self.status == Status::Error {
            return self.try_reconcile_from_error(snapshot);
        }
        if snapshot.open_limit && snapshot.closed_limit {
            self.commit(Status::Error, StopReason::BothLimitsActive);
            return Some(stop_to_error());
        }
        if snapshot.fault {
            self.commit(Status::Error, StopReason::FaultDetected);
            return Some(stop_to_error());
        }
        match self.status {
            Status::Opening if snapshot.closed_limit => {
                // Wrong limit asserted while opening: hardware is inconsistent.
                self.commit(Status::Error, StopReason::BothLimitsActive);
                Some(stop_to_error())
            }
            Status::Opening if snapshot.open_limit => {
                self.commit(Status::Open, StopReason::LimitSwitchReached);
                Some(Action::Drive {
                    relays: SAFE_TUPLE,
                    status: Status::Open,
                    arm_watchdog: false,
                    cancel_watchdog: true,
                })
            }
            Status::Closing if snapshot.open_limit => {
                self.commit(Status::Error, StopReason::BothLimitsActive);
                Some(stop_to_error())
            }
            Status::Closing if snapshot.closed_limit => {
                self.commit(Status::Closed, StopReason::LimitSwitchReached);
                Some(Action::Drive {
                    relays: SAFE_TUPLE,
                    status: Status::Closed,
                    arm_watchdog: false,
                    cancel_watchdog: true,
                })
            }
            _ => None,
        }
    }

    /// Report that the ClearFault relay has been pulsed and released. Attempts an
    /// immediate reconciliation; if the fault (or both-limits) condition is still present,
    /// the machine stays latched in `Error` and arms for the next sensor update that clears
    /// it (§4.5: "latches commands off until ClearFault completes *and* the fault input
    /// deasserts", whichever happens last).
    pub fn on_clear_fault_pulsed(&mut self, snapshot: SensorSnapshot) -> Action {
        self.clear_fault_armed = true;
        self.try_reconcile_from_error(snapshot).unwrap_or(Action::NoOp)
    }

    fn try_reconcile_from_error(&mut self, snapshot: SensorSnapshot) -> Option<Action> {
        if !self.clear_fault_armed {
            return None;
        }
        let (status, reason) = status_for_snapshot(snapshot);
        if status == Status::Error {
            return None;
        }
        self.clear_fault_armed = false;
        self.commit(status, reason);
        Some(Action::Recovered { status })
    }

    /// A watchdog armed during `Opening`/`Closing` expired without a limit being reached.
    pub fn on_watchdog_expired(&mut self) -> Option<Action> {
        if !self.status.is_moving() {
            return None;
        }
        self.commit(Status::Error, StopReason::SafetyWatchdogTimeout);
        Some(stop_to_error())
    }
}

impl Default for RoofStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

fn stop_to_error() -> Action {
    Action::Drive {
        relays: SAFE_TUPLE,
        status: Status::Error,
        arm_watchdog: false,
        cancel_watchdog: true,
    }
}

/// A status transition delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChanged {
    pub status: Status,
    pub reason: StopReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(open: bool, closed: bool, fault: bool) -> SensorSnapshot {
        SensorSnapshot {
            open_limit: open,
            closed_limit: closed,
            fault,
            at_speed: false,
        }
    }

    #[test]
    fn open_rejected_before_initialize() {
        let mut machine = RoofStateMachine::new();
        assert!(machine.dispatch_command(Command::Open).is_err());
    }

    #[test]
    fn open_then_open_is_idempotent_noop() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        assert!(matches!(
            machine.dispatch_command(Command::Open).unwrap(),
            Action::Drive { status: Status::Opening, .. }
        ));
        assert_eq!(machine.dispatch_command(Command::Open).unwrap(), Action::NoOp);
    }

    #[test]
    fn close_rejected_while_opening() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        machine.dispatch_command(Command::Open).unwrap();
        assert!(machine.dispatch_command(Command::Close).is_err());
    }

    #[test]
    fn manual_stop_mid_travel_is_partial() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        machine.dispatch_command(Command::Open).unwrap();
        let action = machine
            .dispatch_command(Command::Stop(StopReason::NormalStop))
            .unwrap();
        assert!(matches!(action, Action::Drive { status: Status::PartiallyOpen, .. }));
        assert_eq!(machine.status(), Status::PartiallyOpen);
        assert_eq!(machine.last_stop_reason(), StopReason::NormalStop);
    }

    #[test]
    fn open_limit_reached_while_opening_commits_open() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        machine.dispatch_command(Command::Open).unwrap();
        let action = machine.on_sensor_snapshot(snapshot(true, false, false));
        assert!(matches!(action, Some(Action::Drive { status: Status::Open, .. })));
        assert_eq!(machine.last_stop_reason(), StopReason::LimitSwitchReached);
    }

    #[test]
    fn both_limits_asserted_latches_error_exactly_once() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        machine.dispatch_command(Command::Close).unwrap();
        assert!(machine.on_sensor_snapshot(snapshot(true, true, false)).is_some());
        assert_eq!(machine.status(), Status::Error);
        // A second, unchanged observation must not re-emit.
        assert!(machine.on_sensor_snapshot(snapshot(true, true, false)).is_none());
    }

    #[test]
    fn fault_clear_requires_both_pulse_and_deassert() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, true));
        assert_eq!(machine.status(), Status::Error);
        assert_eq!(machine.last_stop_reason(), StopReason::FaultDetected);

        // ClearFault pulsed while the fault input is still asserted: stays latched.
        let action = machine.on_clear_fault_pulsed(snapshot(false, false, true));
        assert_eq!(action, Action::NoOp);
        assert_eq!(machine.status(), Status::Error);

        // The fault input deasserts on a later tick: now it recovers.
        let action = machine.on_sensor_snapshot(snapshot(false, false, false));
        assert!(matches!(action, Some(Action::Recovered { status: Status::Stopped })));
        assert_eq!(machine.status(), Status::Stopped);
    }

    #[test]
    fn clear_fault_rejected_without_latched_fault() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        assert!(machine.dispatch_command(Command::ClearFault).is_err());
    }

    #[test]
    fn watchdog_expiry_ignored_when_not_moving() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        assert_eq!(machine.on_watchdog_expired(), None);
    }

    #[test]
    fn watchdog_expiry_while_moving_latches_error() {
        let mut machine = RoofStateMachine::new();
        machine.initialize(snapshot(false, false, false));
        machine.dispatch_command(Command::Open).unwrap();
        let action = machine.on_watchdog_expired();
        assert!(matches!(action, Some(Action::Drive { status: Status::Error, .. })));
        assert_eq!(machine.last_stop_reason(), StopReason::SafetyWatchdogTimeout);
    }
}
