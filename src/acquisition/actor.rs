//! Actor that serialises every controller event.
//!
//! The actor owns the [`AcquisitionController`] outright. Trigger presses,
//! configuration changes and timer ticks all reach it through one loop, so the
//! controller is never re-entered and no locks are needed.
//!
//! # Event Loop
//!
//! ```text
//! AcquisitionHandle ──mpsc──> ┌─────────────────────────┐ ──broadcast──> subscribers
//!                             │ select! (biased)        │
//!                             │   1. command queue      │
//!                             │   2. timer deadline     │
//!                             └─────────────────────────┘
//! ```
//!
//! Queued commands win over a due tick, so a mode change that is already
//! queued takes effect before the next sweep sample. The timer deadline is
//! re-armed whenever [`AcquisitionController::timer_period`] changes and after
//! every tick.

#[cfg(feature = "storage_csv")]
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::controller::{AcquisitionController, AcquisitionEvent, AcquisitionOutput, ControllerSnapshot};
use super::messages::AcquisitionCommand;
use super::sample_log::PlotData;
use super::state::Mode;
use super::sweep::SweepSpec;
use crate::config::AcquisitionSettings;
use crate::error::{AppResult, DaqError};
use crate::hardware::{SourceKind, SourceMeasure};

/// Capacity of the output broadcast channel. Slow subscribers see `Lagged`.
const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Task-side half of the acquisition service.
pub struct AcquisitionActor<S: SourceMeasure> {
    controller: AcquisitionController<S>,
    outputs: broadcast::Sender<AcquisitionOutput>,
    clear_on_reconfigure: bool,
}

impl<S: SourceMeasure + 'static> AcquisitionActor<S> {
    /// Wrap a controller. Use [`spawn`](Self::spawn) unless the loop is driven
    /// by hand.
    pub fn new(
        controller: AcquisitionController<S>,
        outputs: broadcast::Sender<AcquisitionOutput>,
        clear_on_reconfigure: bool,
    ) -> Self {
        Self {
            controller,
            outputs,
            clear_on_reconfigure,
        }
    }

    /// Spawn the actor and return a handle to it.
    ///
    /// The join handle yields the controller back once the actor stops, so the
    /// caller can release the instrument and inspect the final log.
    pub fn spawn(
        controller: AcquisitionController<S>,
        settings: &AcquisitionSettings,
    ) -> (AcquisitionHandle, JoinHandle<AcquisitionController<S>>) {
        let (command_tx, command_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (outputs, _) = broadcast::channel(OUTPUT_CHANNEL_CAPACITY);
        let actor = Self::new(controller, outputs.clone(), settings.clear_on_reconfigure);
        let task = tokio::spawn(actor.run(command_rx));
        (AcquisitionHandle::new(command_tx, outputs), task)
    }

    /// Process commands and timer ticks until shutdown or until every handle
    /// is dropped.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<AcquisitionCommand>) -> AcquisitionController<S> {
        info!(
            "Acquisition actor started ({}, mode {})",
            self.controller.instrument().name(),
            self.controller.mode()
        );

        let mut period = self.controller.timer_period();
        let mut deadline = Instant::now() + period;

        loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => {
                    match command {
                        Some(AcquisitionCommand::Shutdown { response }) => {
                            info!("Shutdown command received");
                            let _ = response.send(());
                            break;
                        }
                        Some(command) => self.dispatch(command).await,
                        None => {
                            info!("All acquisition handles dropped");
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep_until(deadline) => {
                    if let Err(e) = self.apply(AcquisitionEvent::Tick).await {
                        warn!("Timer tick failed, will retry: {}", e);
                    }
                    deadline = Instant::now() + self.controller.timer_period();
                }
            }

            let next = self.controller.timer_period();
            if next != period {
                debug!("Timer period {:?} -> {:?}", period, next);
                period = next;
                deadline = Instant::now() + period;
            }
        }

        info!("Acquisition actor stopped");
        self.controller
    }

    async fn dispatch(&mut self, command: AcquisitionCommand) {
        match command {
            AcquisitionCommand::Trigger { count, response } => {
                let result = self.apply(AcquisitionEvent::Trigger(count)).await;
                let _ = response.send(result);
            }
            AcquisitionCommand::Tick { response } => {
                let result = self.apply(AcquisitionEvent::Tick).await;
                let _ = response.send(result);
            }
            AcquisitionCommand::SetMode { mode, response } => {
                let changed = self.controller.set_mode(mode);
                if changed {
                    self.clear_after_reconfigure();
                }
                let _ = response.send(changed);
            }
            AcquisitionCommand::SetSourceKind { kind, response } => {
                let before = self.controller.source_kind();
                let result = self.controller.set_source_kind(kind).await;
                if result.is_ok() && before != kind {
                    self.clear_after_reconfigure();
                }
                let _ = response.send(result);
            }
            AcquisitionCommand::SetKnob { value, response } => {
                let _ = response.send(self.controller.set_knob(value));
            }
            AcquisitionCommand::SetSweep { spec, response } => {
                let _ = response.send(self.controller.set_sweep_spec(spec));
            }
            AcquisitionCommand::ClearLog { response } => {
                self.controller.clear_log();
                let _ = response.send(());
            }
            AcquisitionCommand::ResetTriggerCounter { count, response } => {
                self.controller.reset_trigger_counter(count);
                let _ = response.send(());
            }
            AcquisitionCommand::GetPlotData { response } => {
                let _ = response.send(self.controller.plot_data());
            }
            AcquisitionCommand::GetSnapshot { response } => {
                let _ = response.send(self.controller.snapshot());
            }
            #[cfg(feature = "storage_csv")]
            AcquisitionCommand::ExportCsv { path, response } => {
                let _ = response.send(self.controller.sample_log().export_csv(&path));
            }
            AcquisitionCommand::Shutdown { response } => {
                // Handled by the event loop; answer anyway if routed here.
                let _ = response.send(());
            }
        }
    }

    /// Run one controller event and publish its output.
    async fn apply(&mut self, event: AcquisitionEvent) -> AppResult<AcquisitionOutput> {
        let output = self.controller.handle(event).await?;
        // No subscribers is not an error.
        let _ = self.outputs.send(output.clone());
        Ok(output)
    }

    fn clear_after_reconfigure(&mut self) {
        if self.clear_on_reconfigure {
            self.controller.clear_log();
        }
    }
}

/// Cloneable handle to a running [`AcquisitionActor`].
///
/// Also plays the part of the trigger control: [`press`](Self::press) bumps a
/// shared counter and delivers it.
#[derive(Clone)]
pub struct AcquisitionHandle {
    command_tx: mpsc::Sender<AcquisitionCommand>,
    outputs: broadcast::Sender<AcquisitionOutput>,
    presses: Arc<AtomicU64>,
}

impl AcquisitionHandle {
    fn new(command_tx: mpsc::Sender<AcquisitionCommand>, outputs: broadcast::Sender<AcquisitionOutput>) -> Self {
        Self {
            command_tx,
            outputs,
            presses: Arc::new(AtomicU64::new(0)),
        }
    }

    async fn request<T>(&self, (command, rx): (AcquisitionCommand, oneshot::Receiver<T>)) -> AppResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| DaqError::ActorStopped)?;
        rx.await.map_err(|_| DaqError::ActorStopped)
    }

    /// Receive the output of every trigger and tick from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionOutput> {
        self.outputs.subscribe()
    }

    /// Press the trigger: increment the counter and deliver it.
    pub async fn press(&self) -> AppResult<AcquisitionOutput> {
        let count = self.presses.fetch_add(1, Ordering::SeqCst) + 1;
        self.trigger(count).await
    }

    /// Deliver a raw counter value. Repeats of the last value are ignored.
    pub async fn trigger(&self, count: u64) -> AppResult<AcquisitionOutput> {
        self.request(AcquisitionCommand::trigger(count)).await?
    }

    /// Run one timer step now, regardless of the timer.
    pub async fn tick(&self) -> AppResult<AcquisitionOutput> {
        self.request(AcquisitionCommand::tick()).await?
    }

    /// Select the mode. A change restarts the press counter, matching the
    /// controller's freshly resynchronised edge detector.
    pub async fn set_mode(&self, mode: Mode) -> AppResult<()> {
        if self.request(AcquisitionCommand::set_mode(mode)).await? {
            self.presses.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Change the sourced quantity; see
    /// [`AcquisitionController::set_source_kind`].
    pub async fn set_source_kind(&self, kind: SourceKind) -> AppResult<()> {
        self.request(AcquisitionCommand::set_source_kind(kind)).await?
    }

    /// Set the manual source value.
    pub async fn set_knob(&self, value: f64) -> AppResult<()> {
        self.request(AcquisitionCommand::set_knob(value)).await?
    }

    /// Replace the sweep parameters.
    pub async fn set_sweep(&self, spec: SweepSpec) -> AppResult<()> {
        self.request(AcquisitionCommand::set_sweep(spec)).await?
    }

    /// Empty the sample log.
    pub async fn clear_log(&self) -> AppResult<()> {
        self.request(AcquisitionCommand::clear_log()).await
    }

    /// Restart the press counter at zero, as after a front-end reload.
    pub async fn reset_trigger_counter(&self) -> AppResult<()> {
        self.presses.store(0, Ordering::SeqCst);
        self.request(AcquisitionCommand::reset_trigger_counter(0)).await
    }

    /// Sorted points for plotting.
    pub async fn plot_data(&self) -> AppResult<PlotData> {
        self.request(AcquisitionCommand::get_plot_data()).await
    }

    /// Current controller state.
    pub async fn snapshot(&self) -> AppResult<ControllerSnapshot> {
        self.request(AcquisitionCommand::get_snapshot()).await
    }

    /// Write the sample log to `path` as CSV.
    #[cfg(feature = "storage_csv")]
    pub async fn export_csv(&self, path: impl Into<PathBuf>) -> AppResult<()> {
        self.request(AcquisitionCommand::export_csv(path.into())).await?
    }

    /// Stop the actor. The join handle then yields the controller.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.request(AcquisitionCommand::shutdown()).await
    }
}
