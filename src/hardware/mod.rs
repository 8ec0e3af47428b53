//! Instrument abstraction layer.
//!
//! - [`capabilities`]: the [`SourceMeasure`] trait every SMU backend implements
//! - [`mock`]: deterministic simulated SMU ([`MockSmu`]) built on an [`IvModel`]
//! - [`keithley_2400`]: SCPI driver for the Keithley 2400 over any transport
//! - [`smu`]: the [`Smu`] handle, with the backend selected once at construction

pub mod capabilities;
pub mod keithley_2400;
pub mod mock;
pub mod smu;

pub use capabilities::{ChannelState, InstrumentError, SourceKind, SourceMeasure};
pub use keithley_2400::Keithley2400;
pub use mock::{IvModel, MockSmu};
pub use smu::Smu;
