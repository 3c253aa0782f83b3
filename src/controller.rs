//! Public controller API
//!
//! [`Controller`] is the single entry point applications use: it owns the HAT driver, the
//! input interpreter, the relay sequencer, the LED indicator, the safety watchdog, and the
//! roof state machine, and wires them together with the background polling and periodic
//! verification tasks described in the module docs for [`crate::hat`], [`crate::verifier`]
//! and [`crate::watchdog`].
//!
//! Every command-shaped method (`open`, `close`, `stop`, `clear_fault`) takes the state
//! machine's lock with `try_lock`, not `lock().await`: a handler reacting to a
//! [`StatusChanged`](crate::roof::StatusChanged) notification that calls back into the same
//! controller synchronously will find the lock held and get `CommandRejected`, rather than
//! deadlocking or reentering mid-transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{Result, RoofError};
use crate::hat::FourRelayFourInputHat;
use crate::i2c::{I2cTransport, RegisterClient};
use crate::input::InputInterpreter;
use crate::led::StatusLed;
use crate::relay::RelaySequencer;
use crate::roof::config::RoofConfiguration;
use crate::roof::{Action, Command, RoofStateMachine, Status, StatusChanged, StopReason};
use crate::watchdog::Watchdog;

/// A snapshot of everything the roof's external interface (§6) exposes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: Status,
    pub last_stop_reason: StopReason,
    pub last_transition: SystemTime,
    pub is_moving: bool,
    pub is_watchdog_active: bool,
    pub is_at_speed: bool,
    pub open_limit: bool,
    pub closed_limit: bool,
    pub fault: bool,
}

/// Owns the full roof control stack and exposes the commands applications issue.
pub struct Controller<T> {
    hat: Arc<FourRelayFourInputHat<T>>,
    interpreter: Arc<InputInterpreter>,
    relays: RelaySequencer<T>,
    led: StatusLed<T>,
    watchdog: Arc<Watchdog>,
    state: Mutex<RoofStateMachine>,
    config: RwLock<RoofConfiguration>,
    status_tx: broadcast::Sender<StatusChanged>,
    background: StdMutex<Vec<JoinHandle<()>>>,
    cancellation: CancellationToken,
    shutdown_started: AtomicBool,
    last_transition: StdMutex<SystemTime>,
}

impl<T: I2cTransport + 'static> Controller<T> {
    /// Build a controller over `transport`, addressing the HAT at `address`, and spawn its
    /// background digital-input and periodic-verification tasks per `configuration`.
    pub fn new(transport: T, address: u8, configuration: RoofConfiguration) -> Result<Arc<Self>> {
        configuration.validate()?;

        let client = Arc::new(RegisterClient::with_post_transaction_delay(
            transport,
            address,
            configuration.post_transaction_delay,
        ));
        let hat = Arc::new(FourRelayFourInputHat::new(client));
        let interpreter = Arc::new(InputInterpreter::new(
            configuration.use_normally_closed_limit_switches,
            configuration.limit_switch_debounce,
            configuration.ignore_physical_limit_switches,
        ));
        let relays = RelaySequencer::new(Arc::clone(&hat), configuration.relay_mapping);
        let led = StatusLed::new(Arc::clone(&hat));
        let (status_tx, _rx) = broadcast::channel(32);

        let controller = Arc::new(Controller {
            hat,
            interpreter,
            relays,
            led,
            watchdog: Watchdog::new(),
            state: Mutex::new(RoofStateMachine::new()),
            config: RwLock::new(configuration.clone()),
            status_tx,
            background: StdMutex::new(Vec::new()),
            cancellation: CancellationToken::new(),
            shutdown_started: AtomicBool::new(false),
            last_transition: StdMutex::new(SystemTime::now()),
        });
        controller.spawn_background_tasks(&configuration);
        Ok(controller)
    }

    fn spawn_background_tasks(self: &Arc<Self>, configuration: &RoofConfiguration) {
        let mut handles = self.background.lock().unwrap();
        if configuration.enable_digital_input_polling {
            handles.push(self.spawn_input_pipeline(configuration.digital_input_poll_interval));
        }
        if configuration.enable_periodic_verification_while_moving {
            handles.push(crate::verifier::spawn_periodic_verifier(
                Arc::clone(self),
                configuration.periodic_verification_interval,
                self.cancellation.clone(),
            ));
        }
    }

    fn spawn_input_pipeline(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = controller.cancellation.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = controller.poll_inputs_once().await {
                            warn!(%error, "digital input poll failed");
                        }
                    }
                }
            }
        })
    }

    async fn poll_inputs_once(self: &Arc<Self>) -> Result<()> {
        let mask = self.hat.read_inputs().await?;
        let changes = self.interpreter.observe_raw_mask(mask);
        if changes.is_empty() {
            return Ok(());
        }
        self.reconcile_sensors().await
    }

    async fn reconcile_sensors(self: &Arc<Self>) -> Result<()> {
        let snapshot = self.interpreter.snapshot();
        let action = {
            let mut guard = self.state.lock().await;
            guard.on_sensor_snapshot(snapshot)
        };
        if let Some(action) = action {
            self.apply_action(action).await?;
        }
        self.led.apply(snapshot).await
    }

    /// Force a fresh hardware read and reconcile the state machine against it, without
    /// waiting for the next polling tick. Used by [`crate::verifier`].
    pub async fn force_refresh(self: &Arc<Self>) -> Result<()> {
        let mask = self.hat.read_inputs().await?;
        self.interpreter.observe_raw_mask(mask);
        self.reconcile_sensors().await
    }

    /// Read the hardware once to establish the initial committed sensor baseline, and
    /// derive the initial [`Status`] from it. Also reads and logs the HAT's hardware
    /// revision, for diagnostics.
    #[instrument(level = "info", skip(self))]
    pub async fn initialize(self: &Arc<Self>) -> Result<Status> {
        let (major, minor) = self.hat.hardware_revision().await?;
        info!(major, minor, "HAT hardware revision");

        let mask = self.hat.read_inputs().await?;
        let snapshot = self.interpreter.commit_initial(mask);
        let (status, reason) = {
            let mut guard = self.state.lock().await;
            guard.initialize(snapshot)
        };
        self.led.apply(snapshot).await?;
        *self.last_transition.lock().unwrap() = SystemTime::now();
        let _ = self.status_tx.send(StatusChanged { status, reason });
        Ok(status)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn open(self: &Arc<Self>) -> Result<()> {
        self.execute_command(Command::Open).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn close(self: &Arc<Self>) -> Result<()> {
        self.execute_command(Command::Close).await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn stop(self: &Arc<Self>, reason: StopReason) -> Result<()> {
        self.execute_command(Command::Stop(reason)).await
    }

    async fn execute_command(self: &Arc<Self>, command: Command) -> Result<()> {
        let action = {
            let mut guard = self.state.try_lock().map_err(|_| {
                RoofError::CommandRejected("reentrant call into roof state machine".into())
            })?;
            guard.dispatch_command(command)?
        };
        self.apply_action(action).await
    }

    /// Pulse the ClearFault relay for `pulse`, then reconcile status from the current
    /// sensor snapshot. Only accepted while the roof is in `Error`.
    #[instrument(level = "info", skip(self, cancellation))]
    pub async fn clear_fault(
        self: &Arc<Self>,
        pulse: Duration,
        cancellation: CancellationToken,
    ) -> Result<()> {
        {
            let mut guard = self.state.try_lock().map_err(|_| {
                RoofError::CommandRejected("reentrant call into roof state machine".into())
            })?;
            match guard.dispatch_command(Command::ClearFault)? {
                Action::PulseClearFault => {}
                _ => unreachable!("ClearFault dispatch always yields PulseClearFault or Err"),
            }
        }

        let pulse_result = self.relays.clear_fault(pulse, cancellation).await;

        let snapshot = self.interpreter.snapshot();
        let action = {
            let mut guard = self.state.lock().await;
            guard.on_clear_fault_pulsed(snapshot)
        };
        self.apply_action(action).await?;
        self.led.apply(snapshot).await?;

        pulse_result
    }

    async fn apply_action(self: &Arc<Self>, action: Action) -> Result<()> {
        match action {
            Action::NoOp | Action::PulseClearFault => Ok(()),
            Action::Drive {
                relays,
                status,
                arm_watchdog,
                cancel_watchdog,
            } => {
                let relay_result = self
                    .relays
                    .set_relay_states_atomically(relays.0, relays.1, relays.2)
                    .await;
                if cancel_watchdog {
                    self.watchdog.cancel();
                }
                if arm_watchdog {
                    self.arm_watchdog().await;
                }
                self.emit_status_changed(status).await;
                relay_result
            }
            Action::Recovered { status } => {
                self.emit_status_changed(status).await;
                Ok(())
            }
        }
    }

    async fn arm_watchdog(self: &Arc<Self>) {
        let timeout = self.config.read().await.safety_watchdog_timeout;
        let controller = Arc::clone(self);
        self.watchdog.arm(timeout, move || {
            Box::pin(async move {
                let action = {
                    let mut guard = controller.state.lock().await;
                    guard.on_watchdog_expired()
                };
                if let Some(action) = action {
                    if let Err(error) = controller.apply_action(action).await {
                        warn!(%error, "post-watchdog-expiry relay write failed");
                    }
                }
            })
        });
    }

    async fn emit_status_changed(&self, status: Status) {
        let reason = self.state.lock().await.last_stop_reason();
        *self.last_transition.lock().unwrap() = SystemTime::now();
        let _ = self.status_tx.send(StatusChanged { status, reason });
    }

    /// Subscribe to status transitions. Every observable transition is sent exactly once.
    pub fn status_changed(&self) -> broadcast::Receiver<StatusChanged> {
        self.status_tx.subscribe()
    }

    /// Everything the external interface (§6) exposes: status, last stop reason, last
    /// transition time, motion/watchdog flags, and the three raw-derived sensor bits.
    pub async fn status_snapshot(&self) -> StatusSnapshot {
        let (status, last_stop_reason) = {
            let guard = self.state.lock().await;
            (guard.status(), guard.last_stop_reason())
        };
        let sensors = self.interpreter.snapshot();
        StatusSnapshot {
            status,
            last_stop_reason,
            last_transition: *self.last_transition.lock().unwrap(),
            is_moving: status.is_moving(),
            is_watchdog_active: self.watchdog.is_active(),
            is_at_speed: sensors.at_speed,
            open_limit: sensors.open_limit,
            closed_limit: sensors.closed_limit,
            fault: sensors.fault,
        }
    }

    /// Whether the safety watchdog is currently armed.
    pub fn is_watchdog_active(&self) -> bool {
        self.watchdog.is_active()
    }

    /// The active configuration.
    pub async fn configuration(&self) -> RoofConfiguration {
        self.config.read().await.clone()
    }

    /// Replace the active configuration, provided the roof is neither moving nor the
    /// watchdog armed. Rejected atomically: on error the prior configuration is untouched.
    #[instrument(level = "debug", skip(self, new_configuration))]
    pub async fn update_configuration(
        self: &Arc<Self>,
        new_configuration: RoofConfiguration,
    ) -> Result<()> {
        new_configuration.validate()?;
        let snapshot = self.status_snapshot().await;
        if snapshot.status.is_moving() || self.watchdog.is_active() {
            return Err(RoofError::InvalidOperation(
                "cannot update configuration while the roof is moving or the watchdog is armed"
                    .into(),
            ));
        }
        *self.config.write().await = new_configuration;
        Ok(())
    }

    /// Idempotently stop the roof, cancel background tasks, and await their completion.
    #[instrument(level = "info", skip(self))]
    pub async fn shutdown(self: &Arc<Self>) -> Result<()> {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self
            .execute_command(Command::Stop(StopReason::SystemShutdown))
            .await;
        self.cancellation.cancel();
        let handles: Vec<_> = std::mem::take(&mut *self.background.lock().unwrap());
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }
}
