//! # SMU DAQ Core Library
//!
//! Front end for a source-measure unit (SMU): a trigger-driven acquisition
//! controller that takes single source/measure samples or runs timed sweeps,
//! records every pair in an append-only log, and hands sorted points to a
//! plotting front end. The instrument is either a deterministic simulator or a
//! Keithley 2400 reached over serial or a Prologix GPIB-USB controller.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: The `AcquisitionController` state machine (modes, sweep
//!   progression, trigger edge detection), the `SampleLog`, and an actor that
//!   runs the controller behind a command queue with a sweep timer.
//! - **`hardware`**: The `SourceMeasure` capability trait, the `MockSmu` solar
//!   cell simulator, the `Keithley2400` SCPI driver, and the `Smu` handle that
//!   picks a backend once at construction.
//! - **`adapters`**: Byte transports under the drivers: serial, Prologix
//!   GPIB-USB, and a scripted mock for tests.
//! - **`config`**: Figment-based `Settings` loaded from `config/smu.toml` and
//!   `SMU_DAQ_*` environment variables.
//! - **`error`**: The crate-wide `DaqError` enum.
//! - **`logging`**: `tracing-subscriber` initialization.

pub mod acquisition;
pub mod adapters;
pub mod config;
pub mod error;
pub mod hardware;
pub mod logging;

pub use error::{AppResult, DaqError};
