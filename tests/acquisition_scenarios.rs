//! Acquisition controller scenarios against the simulated SMU.
//!
//! Covers single shots, full sweeps, trigger de-duplication, mode changes
//! mid-sweep, rejected configuration and retry after instrument failure.

use smu_daq::acquisition::{
    AcquisitionController, AcquisitionEvent, ControllerPhase, Mode, SweepSpec, SweepState,
};
use smu_daq::hardware::{IvModel, MockSmu, SourceKind, SourceMeasure};
use smu_daq::DaqError;

fn sweep_controller(spec: SweepSpec) -> AcquisitionController<MockSmu> {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.set_mode(Mode::Sweep);
    controller.set_sweep_spec(spec).unwrap();
    controller
}

/// Tick until the sweep deactivates; returns the number of ticks used.
async fn run_to_completion(controller: &mut AcquisitionController<MockSmu>) -> usize {
    let mut ticks = 0;
    while controller.is_sweep_active() {
        controller.handle(AcquisitionEvent::Tick).await.unwrap();
        ticks += 1;
        assert!(ticks < 10_000, "sweep did not terminate");
    }
    ticks
}

// =============================================================================
// Single mode
// =============================================================================

#[tokio::test]
async fn test_single_shot_matches_closed_form_curve() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.set_knob(5.0).unwrap();

    let output = controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();

    let expected = (1.0 - 2.694e-6 * ((5.0_f64 / (0.077976842 * 20.5)).exp() - 1.0)) * 3.45;
    let sample = controller.sample_log().last().unwrap();
    assert_eq!(sample.source_value, 5.0);
    assert!((sample.measured_value - expected).abs() < 1e-12);
    assert_eq!(output.source_display, "5.0000");
    assert_eq!(output.measured_display, format!("{expected:.4}"));
    assert!(output.graph_dirty);
    assert!(!output.sweep_active);
}

#[tokio::test]
async fn test_source_current_measures_voltage() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.set_source_kind(SourceKind::Current).await.unwrap();
    controller.set_knob(1.0).unwrap();

    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();

    let expected = IvModel::default().evaluate(SourceKind::Current, 1.0);
    let sample = controller.sample_log().last().unwrap();
    assert!((sample.measured_value - expected).abs() < 1e-12);
    assert_eq!(controller.plot_data().x_label, "Applied Current (A)");
}

#[tokio::test]
async fn test_each_new_edge_takes_one_sample() {
    let mut controller = AcquisitionController::new(MockSmu::new());

    for (count, knob) in [(1, 0.5), (2, 1.5), (3, 2.5)] {
        controller.set_knob(knob).unwrap();
        controller.handle(AcquisitionEvent::Trigger(count)).await.unwrap();
    }

    let xs: Vec<f64> = controller.sample_log().iter().map(|s| s.source_value).collect();
    assert_eq!(xs, vec![0.5, 1.5, 2.5]);
}

// =============================================================================
// Trigger de-duplication
// =============================================================================

#[tokio::test]
async fn test_duplicate_trigger_is_noop_in_single_mode() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    let ops = controller.instrument().operation_count();

    let output = controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    assert!(!output.graph_dirty);
    assert_eq!(controller.sample_log().len(), 1);
    assert_eq!(controller.instrument().operation_count(), ops);
}

#[tokio::test]
async fn test_duplicate_trigger_is_noop_in_sweep_mode() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();
    assert_eq!(controller.sweep_state(), SweepState::Running);
    let ticks = controller.tick_count();

    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    assert_eq!(controller.sweep_state(), SweepState::Running);
    assert_eq!(controller.tick_count(), ticks);
    assert_eq!(controller.sample_log().len(), 1);
}

#[tokio::test]
async fn test_new_edge_during_sweep_does_not_restart_it() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();

    controller.handle(AcquisitionEvent::Trigger(2)).await.unwrap();
    assert_eq!(controller.tick_count(), 2);

    // The acknowledged edge is not replayed once the sweep ends.
    run_to_completion(&mut controller).await;
    let output = controller.handle(AcquisitionEvent::Trigger(2)).await.unwrap();
    assert!(!output.sweep_active);
}

#[tokio::test]
async fn test_reset_trigger_counter_after_reload() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.handle(AcquisitionEvent::Trigger(4)).await.unwrap();

    controller.reset_trigger_counter(0);
    assert!(!controller.handle(AcquisitionEvent::Trigger(0)).await.unwrap().graph_dirty);
    assert!(controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap().graph_dirty);
    assert_eq!(controller.sample_log().len(), 2);
}

// =============================================================================
// Sweeps
// =============================================================================

#[tokio::test]
async fn test_default_sweep_produces_nine_samples_including_stop() {
    let mut controller = sweep_controller(SweepSpec::default());

    let armed = controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    assert!(armed.sweep_active);
    assert!(!armed.graph_dirty);
    assert_eq!(controller.sweep_state(), SweepState::Armed);
    assert!(controller.sample_log().is_empty());

    let ticks = run_to_completion(&mut controller).await;

    // Nine sampling ticks plus the tick that detects the crossing.
    assert_eq!(ticks, 10);
    let xs: Vec<f64> = controller.sample_log().iter().map(|s| s.source_value).collect();
    assert_eq!(xs, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    assert_eq!(controller.sweep_state(), SweepState::Inactive);
    assert_eq!(controller.last_output().source_display, "9.0000");
}

#[tokio::test]
async fn test_sweep_candidates_follow_start_plus_k_step() {
    let spec = SweepSpec::new(-0.3, 0.45, 0.05, 10).unwrap();
    let mut controller = sweep_controller(spec);
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    run_to_completion(&mut controller).await;

    let xs: Vec<f64> = controller.sample_log().iter().map(|s| s.source_value).collect();
    assert_eq!(xs.len() as u64, spec.point_count());
    for (k, x) in xs.iter().enumerate() {
        assert_eq!(*x, spec.candidate(k as u64));
    }
    let last = *xs.last().unwrap();
    assert!(last <= 0.45 + 1e-9);
    assert!(spec.crossed(last + spec.step));
}

#[tokio::test]
async fn test_descending_sweep() {
    let mut controller = sweep_controller(SweepSpec::new(3.0, 0.0, -1.0, 10).unwrap());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    run_to_completion(&mut controller).await;

    let xs: Vec<f64> = controller.sample_log().iter().map(|s| s.source_value).collect();
    assert_eq!(xs, vec![3.0, 2.0, 1.0, 0.0]);
}

#[tokio::test]
async fn test_sweep_can_be_rearmed_after_completion() {
    let mut controller = sweep_controller(SweepSpec::new(0.0, 1.0, 1.0, 10).unwrap());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    run_to_completion(&mut controller).await;

    controller.handle(AcquisitionEvent::Trigger(2)).await.unwrap();
    assert_eq!(controller.sweep_state(), SweepState::Armed);
    run_to_completion(&mut controller).await;
    assert_eq!(controller.sample_log().len(), 4);
}

#[tokio::test]
async fn test_switching_to_single_stops_running_sweep() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();

    controller.set_mode(Mode::Single);
    assert!(!controller.last_output().sweep_active);
    assert_eq!(controller.sweep_state(), SweepState::Inactive);
    assert_eq!(controller.phase(), ControllerPhase::Idle);

    for _ in 0..5 {
        let output = controller.handle(AcquisitionEvent::Tick).await.unwrap();
        assert!(!output.graph_dirty);
    }
    assert_eq!(controller.sample_log().len(), 2);

    let output = controller.handle(AcquisitionEvent::Trigger(2)).await.unwrap();
    assert!(output.graph_dirty);
    assert_eq!(controller.sample_log().len(), 3);
}

#[tokio::test]
async fn test_first_press_after_mode_change_is_an_edge() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Trigger(2)).await.unwrap();
    assert_eq!(controller.sample_log().len(), 2);

    // The recreated trigger control starts counting from 1 again.
    controller.set_mode(Mode::Sweep);
    let armed = controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    assert!(armed.sweep_active);
    assert_eq!(controller.sweep_state(), SweepState::Armed);

    controller.set_mode(Mode::Single);
    let output = controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    assert!(output.graph_dirty);
    assert_eq!(controller.sample_log().len(), 3);
}

#[tokio::test]
async fn test_ticks_before_trigger_are_noops() {
    let mut controller = sweep_controller(SweepSpec::default());
    for _ in 0..3 {
        controller.handle(AcquisitionEvent::Tick).await.unwrap();
    }
    assert!(controller.sample_log().is_empty());
    assert_eq!(controller.instrument().operation_count(), 0);
}

// =============================================================================
// Configuration validation
// =============================================================================

#[tokio::test]
async fn test_zero_step_leaves_state_untouched() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();
    let before_state = controller.sweep_state();
    let before_spec = *controller.sweep_spec();
    let before_log = controller.sample_log().as_slice().to_vec();

    let bad = SweepSpec {
        step: 0.0,
        ..SweepSpec::default()
    };
    let err = controller.set_sweep_spec(bad).unwrap_err();

    assert!(matches!(err, DaqError::InvalidArgument(_)));
    assert_eq!(controller.sweep_state(), before_state);
    assert_eq!(*controller.sweep_spec(), before_spec);
    assert_eq!(controller.sample_log().as_slice(), before_log.as_slice());
}

#[tokio::test]
async fn test_step_pointing_away_from_stop_is_rejected() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    let bad = SweepSpec {
        start: 0.0,
        stop: 5.0,
        step: -1.0,
        dwell_millis: 100,
    };
    assert!(matches!(
        controller.set_sweep_spec(bad),
        Err(DaqError::InvalidArgument(_))
    ));
    assert_eq!(*controller.sweep_spec(), SweepSpec::default());
}

#[tokio::test]
async fn test_changing_spec_mid_sweep_abandons_it() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();

    controller
        .set_sweep_spec(SweepSpec::new(0.0, 2.0, 0.5, 20).unwrap())
        .unwrap();
    assert_eq!(controller.sweep_state(), SweepState::Inactive);
    assert_eq!(controller.sample_log().len(), 1);
}

// =============================================================================
// Instrument failures
// =============================================================================

#[tokio::test]
async fn test_failed_tick_is_retried_at_same_candidate() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();
    controller.handle(AcquisitionEvent::Tick).await.unwrap();

    controller.instrument().trigger_failure();
    let err = controller.handle(AcquisitionEvent::Tick).await.unwrap_err();
    assert!(matches!(err, DaqError::Acquisition { .. }));
    assert!(err.is_retryable());
    assert_eq!(controller.sample_log().len(), 1);
    assert_eq!(controller.tick_count(), 1);
    assert_eq!(controller.sweep_state(), SweepState::Running);
    assert_eq!(controller.phase(), ControllerPhase::AwaitingTrigger);

    controller.handle(AcquisitionEvent::Tick).await.unwrap();
    let xs: Vec<f64> = controller.sample_log().iter().map(|s| s.source_value).collect();
    assert_eq!(xs, vec![1.0, 2.0]);
}

#[tokio::test]
async fn test_failure_on_first_sweep_tick_stays_armed() {
    let mut controller = sweep_controller(SweepSpec::default());
    controller.handle(AcquisitionEvent::Trigger(1)).await.unwrap();

    controller.instrument().trigger_failure();
    assert!(controller.handle(AcquisitionEvent::Tick).await.is_err());
    assert_eq!(controller.sweep_state(), SweepState::Armed);
    assert!(controller.sample_log().is_empty());
}

// =============================================================================
// Sample log ordering
// =============================================================================

#[tokio::test]
async fn test_sorted_view_is_ordered_and_complete() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    for (count, knob) in [(1, 4.0), (2, -2.0), (3, 10.0), (4, 4.0), (5, 0.0)] {
        controller.set_knob(knob).unwrap();
        controller.handle(AcquisitionEvent::Trigger(count)).await.unwrap();
    }

    let sorted = controller.sample_log().sorted_by_x();
    assert!(sorted.windows(2).all(|w| w[0].source_value <= w[1].source_value));
    assert_eq!(sorted.len(), controller.sample_log().len());

    let mut seqs: Vec<u64> = sorted.iter().map(|s| s.sequence).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

    assert_eq!(controller.sample_log().sorted_by_x(), sorted);

    // The two samples at 4.0 keep insertion order.
    let fours: Vec<u64> = sorted
        .iter()
        .filter(|s| s.source_value == 4.0)
        .map(|s| s.sequence)
        .collect();
    assert_eq!(fours, vec![0, 3]);
}

#[tokio::test]
async fn test_source_kind_change_resets_knob() {
    let mut controller = AcquisitionController::new(MockSmu::new());
    controller.set_knob(7.0).unwrap();
    controller.set_source_kind(SourceKind::Current).await.unwrap();
    assert_eq!(controller.knob(), 0.0);
    assert_eq!(
        controller.instrument().channel_state().await.sourcing,
        Some(SourceKind::Current)
    );
}
