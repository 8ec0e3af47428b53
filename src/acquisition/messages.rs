//! Commands accepted by the acquisition actor.
//!
//! Each variant embeds a oneshot sender for its response. The helper
//! constructors build the command together with the matching receiver:
//!
//! ```rust
//! use smu_daq::acquisition::AcquisitionCommand;
//!
//! let (cmd, rx) = AcquisitionCommand::trigger(1);
//! // command_tx.send(cmd).await?;
//! // let output = rx.await??;
//! # drop((cmd, rx));
//! ```

use tokio::sync::oneshot;

use super::controller::{AcquisitionOutput, ControllerSnapshot};
use super::sample_log::PlotData;
use super::state::Mode;
use super::sweep::SweepSpec;
use crate::error::AppResult;
use crate::hardware::SourceKind;

/// Requests handled by [`AcquisitionActor`](super::AcquisitionActor).
///
/// Each variant carries the `oneshot::Sender` its answer goes back on. Use the
/// helper constructors below rather than building variants by hand.
#[derive(Debug)]
pub enum AcquisitionCommand {
    /// Deliver the trigger press counter
    Trigger {
        /// Current press counter of the trigger control
        count: u64,
        /// Outputs of the invocation, or the acquisition error
        response: oneshot::Sender<AppResult<AcquisitionOutput>>,
    },
    /// Run one timer step immediately
    Tick {
        /// Outputs of the tick
        response: oneshot::Sender<AppResult<AcquisitionOutput>>,
    },
    /// Select the mode
    SetMode {
        /// Requested mode
        mode: Mode,
        /// True if the mode actually changed
        response: oneshot::Sender<bool>,
    },
    /// Change the sourced quantity, reconfiguring the instrument
    SetSourceKind {
        /// Requested source kind
        kind: SourceKind,
        /// Instrument reconfiguration result
        response: oneshot::Sender<AppResult<()>>,
    },
    /// Set the manual source value
    SetKnob {
        /// New knob value
        value: f64,
        /// Rejected when not finite
        response: oneshot::Sender<AppResult<()>>,
    },
    /// Replace the sweep parameters
    SetSweep {
        /// New parameters
        spec: SweepSpec,
        /// Rejected when invalid
        response: oneshot::Sender<AppResult<()>>,
    },
    /// Empty the sample log
    ClearLog {
        /// Acknowledgement
        response: oneshot::Sender<()>,
    },
    /// Resynchronise the edge detector after the trigger control was recreated
    ResetTriggerCounter {
        /// Counter value of the new control
        count: u64,
        /// Acknowledgement
        response: oneshot::Sender<()>,
    },
    /// Sorted points for plotting
    GetPlotData {
        /// Plot projection of the log
        response: oneshot::Sender<PlotData>,
    },
    /// Controller state for status queries
    GetSnapshot {
        /// Snapshot at the time the command ran
        response: oneshot::Sender<ControllerSnapshot>,
    },
    /// Write the sample log as CSV
    #[cfg(feature = "storage_csv")]
    ExportCsv {
        /// Destination file
        path: std::path::PathBuf,
        /// Export result
        response: oneshot::Sender<AppResult<()>>,
    },
    /// Stop the actor loop
    Shutdown {
        /// Sent just before the loop exits
        response: oneshot::Sender<()>,
    },
}

impl AcquisitionCommand {
    /// Build a [`Trigger`](Self::Trigger) command.
    pub fn trigger(count: u64) -> (Self, oneshot::Receiver<AppResult<AcquisitionOutput>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Trigger { count, response: tx }, rx)
    }

    /// Build a [`Tick`](Self::Tick) command.
    pub fn tick() -> (Self, oneshot::Receiver<AppResult<AcquisitionOutput>>) {
        let (tx, rx) = oneshot::channel();
        (Self::Tick { response: tx }, rx)
    }

    /// Build a [`SetMode`](Self::SetMode) command.
    pub fn set_mode(mode: Mode) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self::SetMode { mode, response: tx }, rx)
    }

    /// Build a [`SetSourceKind`](Self::SetSourceKind) command.
    pub fn set_source_kind(kind: SourceKind) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::SetSourceKind { kind, response: tx }, rx)
    }

    /// Build a [`SetKnob`](Self::SetKnob) command.
    pub fn set_knob(value: f64) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::SetKnob { value, response: tx }, rx)
    }

    /// Build a [`SetSweep`](Self::SetSweep) command.
    pub fn set_sweep(spec: SweepSpec) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::SetSweep { spec, response: tx }, rx)
    }

    /// Build a [`ClearLog`](Self::ClearLog) command.
    pub fn clear_log() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::ClearLog { response: tx }, rx)
    }

    /// Build a [`ResetTriggerCounter`](Self::ResetTriggerCounter) command.
    pub fn reset_trigger_counter(count: u64) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::ResetTriggerCounter { count, response: tx }, rx)
    }

    /// Build a [`GetPlotData`](Self::GetPlotData) command.
    pub fn get_plot_data() -> (Self, oneshot::Receiver<PlotData>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetPlotData { response: tx }, rx)
    }

    /// Build a [`GetSnapshot`](Self::GetSnapshot) command.
    pub fn get_snapshot() -> (Self, oneshot::Receiver<ControllerSnapshot>) {
        let (tx, rx) = oneshot::channel();
        (Self::GetSnapshot { response: tx }, rx)
    }

    /// Build an [`ExportCsv`](Self::ExportCsv) command.
    #[cfg(feature = "storage_csv")]
    pub fn export_csv(path: std::path::PathBuf) -> (Self, oneshot::Receiver<AppResult<()>>) {
        let (tx, rx) = oneshot::channel();
        (Self::ExportCsv { path, response: tx }, rx)
    }

    /// Build a [`Shutdown`](Self::Shutdown) command.
    pub fn shutdown() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::Shutdown { response: tx }, rx)
    }
}
