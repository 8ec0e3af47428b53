//! Acquisition controller.
//!
//! Owns the instrument, the sample log and every piece of mode/sweep state.
//! The controller is driven by two event sources:
//!
//! - [`AcquisitionEvent::Trigger`] carries the trigger control's press counter.
//!   Only an increase counts as a new edge.
//! - [`AcquisitionEvent::Tick`] is the periodic timer. Its period is read back
//!   from [`AcquisitionController::timer_period`] after every event.
//!
//! Configuration inputs (mode, source kind, knob, sweep) are applied through
//! setters that validate first and mutate nothing on rejection.
//!
//! Every event returns an [`AcquisitionOutput`]. A failed instrument call
//! returns [`DaqError::Acquisition`] and leaves all state as it was before the
//! event, including the edge detector, so the same trigger or the next tick
//! retries the step.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::edge::{EdgeObservation, TriggerEdgeDetector};
use super::sample_log::{PlotData, SampleLog};
use super::state::{ControllerPhase, Mode, SweepState};
use super::sweep::SweepSpec;
use crate::config::AcquisitionSettings;
use crate::error::{AppResult, DaqError};
use crate::hardware::{SourceKind, SourceMeasure, Smu};

/// Input to [`AcquisitionController::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionEvent {
    /// Current value of the trigger press counter
    Trigger(u64),
    /// Periodic timer fired
    Tick,
}

/// Result of one controller invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionOutput {
    /// Last applied source value, four decimals
    pub source_display: String,
    /// Last measured value, four decimals
    pub measured_display: String,
    /// Whether a sweep is armed or running
    pub sweep_active: bool,
    /// Whether this invocation appended to the sample log
    pub graph_dirty: bool,
}

/// Fixed-point display used for both readouts.
pub fn format_display(value: f64) -> String {
    format!("{value:.4}")
}

/// Point-in-time view of the controller, for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Instrument name, e.g. `Keithley 2400`
    pub instrument: String,
    /// Selected acquisition mode
    pub mode: Mode,
    /// Sourced quantity
    pub source_kind: SourceKind,
    /// Manual source value used in SINGLE mode
    pub knob: f64,
    /// Current sweep parameters
    pub sweep: SweepSpec,
    /// Sweep lifecycle state
    pub sweep_state: SweepState,
    /// Samples taken by the active sweep
    pub tick_count: u64,
    /// Fine-grained activity
    pub phase: ControllerPhase,
    /// Samples held in the log
    pub sample_count: usize,
    /// Period the timer should run at
    pub timer_period_ms: u64,
    /// Outputs as of the last event
    pub output: AcquisitionOutput,
}

/// Acquisition state machine over one [`SourceMeasure`] instrument.
///
/// Not thread-safe on its own; wrap it in an
/// [`AcquisitionActor`](super::AcquisitionActor) to share it.
pub struct AcquisitionController<S: SourceMeasure = Smu> {
    instrument: S,
    log: SampleLog,
    mode: Mode,
    source_kind: SourceKind,
    knob: f64,
    sweep: SweepSpec,
    sweep_state: SweepState,
    /// Samples taken by the active sweep; the next candidate index
    tick_count: u64,
    edges: TriggerEdgeDetector,
    phase: ControllerPhase,
    last_source: f64,
    last_measured: f64,
    idle_period: Duration,
}

impl<S: SourceMeasure> AcquisitionController<S> {
    /// Controller in SINGLE mode, sourcing voltage, with the default sweep.
    pub fn new(instrument: S) -> Self {
        Self {
            instrument,
            log: SampleLog::new(),
            mode: Mode::Single,
            source_kind: SourceKind::Voltage,
            knob: 0.0,
            sweep: SweepSpec::default(),
            sweep_state: SweepState::Inactive,
            tick_count: 0,
            edges: TriggerEdgeDetector::new(),
            phase: ControllerPhase::Idle,
            last_source: 0.0,
            last_measured: 0.0,
            idle_period: Duration::from_millis(1_000_000),
        }
    }

    /// Controller seeded from configuration.
    ///
    /// The instrument is assumed to be configured for `settings.source_kind`
    /// already; see [`Smu::from_settings`].
    pub fn from_settings(instrument: S, settings: &AcquisitionSettings) -> AppResult<Self> {
        settings.sweep.validate()?;
        if !settings.knob.is_finite() {
            return Err(DaqError::InvalidArgument(format!(
                "knob must be finite, got {}",
                settings.knob
            )));
        }
        if settings.idle_poll_ms == 0 {
            return Err(DaqError::InvalidArgument("idle_poll_ms must be positive".into()));
        }

        let mut controller = Self::new(instrument);
        controller.mode = settings.mode;
        controller.source_kind = settings.source_kind;
        controller.knob = settings.knob;
        controller.sweep = settings.sweep;
        controller.idle_period = Duration::from_millis(settings.idle_poll_ms);
        Ok(controller)
    }

    // ========================================================================
    // Configuration inputs
    // ========================================================================

    /// Switch between SINGLE and SWEEP. Returns true if the mode changed.
    ///
    /// A change abandons any sweep in progress and restarts the trigger
    /// counter at zero, since the trigger control is recreated for the new
    /// mode.
    pub fn set_mode(&mut self, mode: Mode) -> bool {
        if mode == self.mode {
            return false;
        }
        info!("Mode changed: {} -> {}", self.mode, mode);
        self.mode = mode;
        self.edges.resync(0);
        self.abandon_sweep();
        true
    }

    /// Change the sourced quantity.
    ///
    /// Reconfigures the instrument first; on failure nothing changes. On
    /// success the knob returns to zero and any sweep is abandoned.
    pub async fn set_source_kind(&mut self, kind: SourceKind) -> AppResult<()> {
        if kind == self.source_kind {
            return Ok(());
        }
        self.instrument
            .configure(kind)
            .await
            .map_err(|cause| DaqError::Acquisition { cause })?;
        info!("Source kind changed: {} -> {}", self.source_kind, kind);
        self.source_kind = kind;
        self.knob = 0.0;
        self.abandon_sweep();
        Ok(())
    }

    /// Set the manual source value used by SINGLE mode.
    pub fn set_knob(&mut self, value: f64) -> AppResult<()> {
        if !value.is_finite() {
            return Err(DaqError::InvalidArgument(format!(
                "knob must be finite, got {value}"
            )));
        }
        self.knob = value;
        Ok(())
    }

    /// Replace the sweep parameters.
    ///
    /// Invalid parameters are rejected with no state change. Changing the
    /// parameters of an active sweep abandons it.
    pub fn set_sweep_spec(&mut self, spec: SweepSpec) -> AppResult<()> {
        spec.validate()?;
        if spec == self.sweep {
            return Ok(());
        }
        self.sweep = spec;
        if self.sweep_state.is_active() {
            info!("Sweep parameters changed while active; sweep abandoned");
            self.abandon_sweep();
        }
        Ok(())
    }

    /// Empty the sample log. Never called implicitly.
    pub fn clear_log(&mut self) {
        debug!("Clearing {} samples", self.log.len());
        self.log.clear();
    }

    /// Align the edge detector with a recreated trigger control.
    pub fn reset_trigger_counter(&mut self, count: u64) {
        self.edges.resync(count);
    }

    /// Last trigger counter value acted on.
    pub fn trigger_count(&self) -> u64 {
        self.edges.last_seen()
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Process one event and return the refreshed outputs.
    #[tracing::instrument(level = "debug", skip(self), fields(mode = %self.mode))]
    pub async fn handle(&mut self, event: AcquisitionEvent) -> AppResult<AcquisitionOutput> {
        match event {
            AcquisitionEvent::Trigger(count) => self.on_trigger(count).await,
            AcquisitionEvent::Tick => self.on_tick().await,
        }
    }

    async fn on_trigger(&mut self, count: u64) -> AppResult<AcquisitionOutput> {
        match self.edges.classify(count) {
            EdgeObservation::Repeated => return Ok(self.output(false)),
            EdgeObservation::Rewound => {
                debug!(count, "Trigger counter went backwards; resynchronised");
                self.edges.commit(count);
                return Ok(self.output(false));
            }
            EdgeObservation::New => {}
        }

        match self.mode {
            Mode::Single => {
                let value = self.knob;
                let measured = self.acquire(value).await?;
                self.edges.commit(count);
                self.record(value, measured);
                Ok(self.output(true))
            }
            Mode::Sweep => {
                self.edges.commit(count);
                if self.sweep_state.is_active() {
                    debug!("Trigger ignored: sweep already {}", self.sweep_state);
                } else {
                    self.sweep_state = SweepState::Armed;
                    self.tick_count = 0;
                    self.phase = ControllerPhase::AwaitingTrigger;
                    info!(
                        "Sweep armed: {} to {} step {} ({} points)",
                        self.sweep.start,
                        self.sweep.stop,
                        self.sweep.step,
                        self.sweep.point_count()
                    );
                }
                Ok(self.output(false))
            }
        }
    }

    async fn on_tick(&mut self) -> AppResult<AcquisitionOutput> {
        if self.mode != Mode::Sweep || !self.sweep_state.is_active() {
            return Ok(self.output(false));
        }

        let candidate = self.sweep.candidate(self.tick_count);
        if self.sweep.crossed(candidate) {
            info!("Sweep complete after {} points", self.tick_count);
            self.abandon_sweep();
            return Ok(self.output(false));
        }

        let measured = self.acquire(candidate).await?;
        self.record(candidate, measured);
        self.sweep_state = SweepState::Running;
        self.tick_count += 1;
        Ok(self.output(true))
    }

    /// Source `value`, then read the complement. Mutates only `phase`, and
    /// restores it on failure.
    async fn acquire(&mut self, value: f64) -> AppResult<f64> {
        let kind = self.source_kind;
        let resting = self.phase;

        self.phase = ControllerPhase::Sourcing;
        if let Err(cause) = self.instrument.source(kind, value).await {
            self.phase = resting;
            warn!("Sourcing {} = {} failed: {}", kind, value, cause);
            return Err(DaqError::Acquisition { cause });
        }

        self.phase = ControllerPhase::Measuring;
        match self.instrument.measure(kind.complement()).await {
            Ok(measured) => {
                self.phase = resting;
                Ok(measured)
            }
            Err(cause) => {
                self.phase = resting;
                warn!("Measuring {} failed: {}", kind.complement(), cause);
                Err(DaqError::Acquisition { cause })
            }
        }
    }

    fn record(&mut self, source: f64, measured: f64) {
        let sample = self.log.append(source, measured);
        debug!(
            sequence = sample.sequence,
            source, measured, "Sample recorded"
        );
        self.last_source = source;
        self.last_measured = measured;
        self.phase = self.resting_phase();
    }

    fn abandon_sweep(&mut self) {
        self.sweep_state = SweepState::Inactive;
        self.tick_count = 0;
        self.phase = ControllerPhase::Idle;
    }

    fn resting_phase(&self) -> ControllerPhase {
        if self.sweep_state.is_active() {
            ControllerPhase::AwaitingTrigger
        } else {
            ControllerPhase::Idle
        }
    }

    fn output(&self, graph_dirty: bool) -> AcquisitionOutput {
        AcquisitionOutput {
            source_display: format_display(self.last_source),
            measured_display: format_display(self.last_measured),
            sweep_active: self.is_sweep_active(),
            graph_dirty,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Dwell while a sweep is armed or running, otherwise the idle period.
    pub fn timer_period(&self) -> Duration {
        if self.is_sweep_active() {
            self.sweep.dwell()
        } else {
            self.idle_period
        }
    }

    /// True while a sweep is armed or running in SWEEP mode.
    pub fn is_sweep_active(&self) -> bool {
        self.mode == Mode::Sweep && self.sweep_state.is_active()
    }

    /// Outputs as of the last event, with `graph_dirty` false.
    pub fn last_output(&self) -> AcquisitionOutput {
        self.output(false)
    }

    /// Selected mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Sourced quantity.
    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    /// Manual source value.
    pub fn knob(&self) -> f64 {
        self.knob
    }

    /// Current sweep parameters.
    pub fn sweep_spec(&self) -> &SweepSpec {
        &self.sweep
    }

    /// Sweep lifecycle state.
    pub fn sweep_state(&self) -> SweepState {
        self.sweep_state
    }

    /// Samples taken by the active sweep.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current activity.
    pub fn phase(&self) -> ControllerPhase {
        self.phase
    }

    /// Every sample recorded since the last clear.
    pub fn sample_log(&self) -> &SampleLog {
        &self.log
    }

    /// Sorted plot points labelled for the current source kind.
    pub fn plot_data(&self) -> PlotData {
        self.log.plot_data(self.source_kind)
    }

    /// The driven instrument.
    pub fn instrument(&self) -> &S {
        &self.instrument
    }

    /// Give the instrument back, dropping the log.
    pub fn into_instrument(self) -> S {
        self.instrument
    }

    /// Capture the current state for status reporting.
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            instrument: self.instrument.name().to_string(),
            mode: self.mode,
            source_kind: self.source_kind,
            knob: self.knob,
            sweep: self.sweep,
            sweep_state: self.sweep_state,
            tick_count: self.tick_count,
            phase: self.phase,
            sample_count: self.log.len(),
            timer_period_ms: self.timer_period().as_millis() as u64,
            output: self.last_output(),
        }
    }
}
