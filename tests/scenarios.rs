//! End-to-end scenarios and testable properties for the roof control core, run entirely
//! against [`SimulatedTransport`]; no hardware required.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use roof_hal::controller::Controller;
use roof_hal::i2c::transport::SimulatedTransport;
use roof_hal::roof::config::RoofConfiguration;
use roof_hal::{Status, StopReason};

/// Raw mask with both limit switches in their normally-closed "not reached" rest state
/// (raw HIGH, bits 0 and 1 set), no fault, not at speed.
const IDLE_MASK: u8 = 0b0011;

fn fast_config() -> RoofConfiguration {
    RoofConfiguration {
        enable_digital_input_polling: false,
        enable_periodic_verification_while_moving: false,
        limit_switch_debounce: Duration::ZERO,
        post_transaction_delay: Duration::ZERO,
        ..RoofConfiguration::default()
    }
}

#[tokio::test]
async fn open_to_limit_stops_at_open() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();

    controller.initialize().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Stopped);

    controller.open().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Opening);
    assert_eq!(transport.relay_mask(), 0b1001); // Stop + Open

    // Open limit reached: IN1 goes LOW (NC, asserted), IN2 stays HIGH.
    transport.set_input_mask(0b0010);
    controller.force_refresh().await.unwrap();

    let status = controller.status_snapshot().await;
    assert_eq!(status.status, Status::Open);
    assert_eq!(status.last_stop_reason, StopReason::LimitSwitchReached);
    assert_eq!(transport.relay_mask(), 0);
}

#[tokio::test]
async fn manual_stop_mid_travel_yields_partially_open() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();

    controller.initialize().await.unwrap();
    controller.open().await.unwrap();
    controller.stop(StopReason::NormalStop).await.unwrap();

    let status = controller.status_snapshot().await;
    assert_eq!(status.status, Status::PartiallyOpen);
    assert_eq!(status.last_stop_reason, StopReason::NormalStop);
    assert_eq!(transport.relay_mask(), 0);
}

#[tokio::test]
async fn both_limits_glitch_during_close_emits_exactly_one_error() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();

    let mut changes = controller.status_changed();
    controller.close().await.unwrap();
    assert_eq!(changes.recv().await.unwrap().status, Status::Closing);
    assert_eq!(transport.relay_mask(), 0b1010); // Stop + Close

    // Both limit inputs glitch LOW simultaneously (one interpreter tick, two edges).
    transport.set_input_mask(0b0000);
    controller.force_refresh().await.unwrap();
    controller.force_refresh().await.unwrap(); // redundant tick: must not re-emit

    let changed = changes.recv().await.unwrap();
    assert_eq!(changed.status, Status::Error);
    assert_eq!(changed.reason, StopReason::BothLimitsActive);
    assert!(changes.try_recv().is_err(), "exactly one Error transition expected");
    assert_eq!(transport.relay_mask(), 0);
}

#[tokio::test(start_paused = true)]
async fn watchdog_timeout_without_limit_reached() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let config = RoofConfiguration {
        safety_watchdog_timeout: Duration::from_millis(120),
        ..fast_config()
    };
    let controller = Controller::new(transport.clone(), 0x21, config).unwrap();
    controller.initialize().await.unwrap();

    let mut changes = controller.status_changed();
    controller.open().await.unwrap();
    assert_eq!(changes.recv().await.unwrap().status, Status::Opening);
    assert!(controller.is_watchdog_active());

    // No limit ever asserts; the watchdog fires on its own.
    let expired = changes.recv().await.unwrap();
    assert_eq!(expired.status, Status::Error);
    assert_eq!(expired.reason, StopReason::SafetyWatchdogTimeout);
    assert!(!controller.is_watchdog_active());
    assert_eq!(transport.relay_mask(), 0);
}

#[tokio::test]
async fn fault_trip_then_clear_allows_reopening() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();
    controller.open().await.unwrap();

    // IN3 (fault) asserts HIGH; limits stay at their rest state.
    transport.set_input_mask(0b0111);
    controller.force_refresh().await.unwrap();
    let status = controller.status_snapshot().await;
    assert_eq!(status.status, Status::Error);
    assert_eq!(status.last_stop_reason, StopReason::FaultDetected);

    assert!(controller.open().await.is_err());

    // ClearFault pulses the relay, but the fault input is still asserted: stays latched.
    controller
        .clear_fault(Duration::from_millis(10), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Error);

    // The external fault condition clears.
    transport.set_input_mask(IDLE_MASK);
    controller.force_refresh().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Stopped);

    controller.open().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Opening);
}

#[tokio::test(start_paused = true)]
async fn periodic_verifier_recovers_missed_edge() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let config = RoofConfiguration {
        enable_digital_input_polling: false,
        enable_periodic_verification_while_moving: true,
        periodic_verification_interval: Duration::from_millis(50),
        limit_switch_debounce: Duration::ZERO,
        post_transaction_delay: Duration::ZERO,
        ..RoofConfiguration::default()
    };
    let controller = Controller::new(transport.clone(), 0x21, config).unwrap();
    controller.initialize().await.unwrap();

    let mut changes = controller.status_changed();
    controller.open().await.unwrap();
    assert_eq!(changes.recv().await.unwrap().status, Status::Opening);

    // Flip the input directly, bypassing the (disabled) edge-driven poller entirely.
    transport.set_input_mask(0b0010);

    let changed = changes.recv().await.unwrap();
    assert_eq!(changed.status, Status::Open);
    assert_eq!(changed.reason, StopReason::LimitSwitchReached);
}

#[tokio::test]
async fn p1_open_and_close_relays_never_energized_together() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();

    controller.open().await.unwrap();
    let mask = transport.relay_mask();
    assert!(!(mask & 0b0001 != 0 && mask & 0b0010 != 0));

    controller.stop(StopReason::NormalStop).await.unwrap();
    controller.close().await.unwrap();
    let mask = transport.relay_mask();
    assert!(!(mask & 0b0001 != 0 && mask & 0b0010 != 0));
}

#[tokio::test]
async fn p3_stop_ordering_clears_open_close_then_stop_last() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();

    controller.open().await.unwrap();
    transport.clear_write_log();
    controller.stop(StopReason::NormalStop).await.unwrap();

    let log = transport.write_log();
    let last_three: Vec<_> = log.iter().rev().take(3).rev().cloned().collect();
    assert_eq!(
        last_three,
        vec![
            (roof_hal::hat::registers::RELAY_CLEAR, vec![1]),
            (roof_hal::hat::registers::RELAY_CLEAR, vec![2]),
            (roof_hal::hat::registers::RELAY_CLEAR, vec![4]),
        ]
    );
}

#[tokio::test]
async fn p4_repeating_open_issues_no_writes_and_does_not_rearm_watchdog() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();

    controller.open().await.unwrap();
    transport.clear_write_log();

    controller.open().await.unwrap();
    assert!(transport.write_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn p5_debounce_collapses_two_quick_edges_into_one() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let config = RoofConfiguration {
        enable_digital_input_polling: false,
        enable_periodic_verification_while_moving: false,
        limit_switch_debounce: Duration::from_millis(500),
        post_transaction_delay: Duration::ZERO,
        ..RoofConfiguration::default()
    };
    let controller = Controller::new(transport.clone(), 0x21, config).unwrap();
    controller.initialize().await.unwrap();
    tokio::time::advance(Duration::from_millis(600)).await;
    controller.open().await.unwrap();

    // First edge, well past the debounce window since Initialize: commits.
    transport.set_input_mask(0b0010);
    controller.force_refresh().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Open);

    // Bounce straight back with no time advance: inside the debounce window, ignored.
    transport.set_input_mask(IDLE_MASK);
    controller.force_refresh().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::Open);
}

#[tokio::test]
async fn p6_polarity_duality_produces_identical_outcomes() {
    for use_normally_closed in [true, false] {
        let transport = SimulatedTransport::new();
        let rest_mask: u8 = if use_normally_closed { 0b0011 } else { 0b0000 };
        let asserted_mask: u8 = if use_normally_closed { 0b0010 } else { 0b0001 };
        transport.set_input_mask(rest_mask);

        let config = RoofConfiguration {
            use_normally_closed_limit_switches: use_normally_closed,
            ..fast_config()
        };
        let controller = Controller::new(transport.clone(), 0x21, config).unwrap();
        controller.initialize().await.unwrap();
        controller.open().await.unwrap();

        transport.set_input_mask(asserted_mask);
        controller.force_refresh().await.unwrap();

        let status = controller.status_snapshot().await;
        assert_eq!(status.status, Status::Open);
        assert_eq!(status.last_stop_reason, StopReason::LimitSwitchReached);
    }
}

#[tokio::test]
async fn p8_config_update_rejected_while_moving_leaves_config_untouched() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();
    controller.open().await.unwrap();

    let before = controller.configuration().await;
    let mut attempted = before.clone();
    attempted.safety_watchdog_timeout = Duration::from_secs(5);

    let result = controller.update_configuration(attempted).await;
    assert!(result.is_err());
    assert_eq!(controller.configuration().await, before);
}

#[tokio::test]
async fn initialize_with_both_limits_asserted_is_error() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(0b0000); // both limits asserted (NC, raw LOW)
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();

    let status = controller.initialize().await.unwrap();
    assert_eq!(status, Status::Error);
    assert_eq!(
        controller.status_snapshot().await.last_stop_reason,
        StopReason::BothLimitsActive
    );
}

#[tokio::test]
async fn shutdown_is_idempotent_and_stops_the_roof() {
    let transport = SimulatedTransport::new();
    transport.set_input_mask(IDLE_MASK);
    let controller = Controller::new(transport.clone(), 0x21, fast_config()).unwrap();
    controller.initialize().await.unwrap();
    controller.open().await.unwrap();

    controller.shutdown().await.unwrap();
    assert_eq!(controller.status_snapshot().await.status, Status::PartiallyOpen);
    assert_eq!(transport.relay_mask(), 0);

    // Idempotent: a second call observes the already-cancelled state and returns cleanly.
    controller.shutdown().await.unwrap();
}
