//! Acquisition control: trigger edges, single shots, timed sweeps and the
//! sample log.
//!
//! - [`controller`]: the [`AcquisitionController`] state machine
//! - [`actor`]: runs a controller behind an mpsc queue with a sweep timer
//! - [`sweep`]: [`SweepSpec`] and the stop-crossing test
//! - [`sample_log`]: append-only [`SampleLog`] and [`PlotData`]
//! - [`edge`]: [`TriggerEdgeDetector`]
//! - [`state`]: [`Mode`], [`SweepState`], [`ControllerPhase`]

pub mod actor;
pub mod controller;
pub mod edge;
pub mod messages;
pub mod sample_log;
pub mod state;
pub mod sweep;

pub use actor::{AcquisitionActor, AcquisitionHandle};
pub use controller::{
    format_display, AcquisitionController, AcquisitionEvent, AcquisitionOutput, ControllerSnapshot,
};
pub use edge::{EdgeObservation, TriggerEdgeDetector};
pub use messages::AcquisitionCommand;
pub use sample_log::{PlotData, Sample, SampleLog};
pub use state::{ControllerPhase, Mode, SweepState};
pub use sweep::SweepSpec;
