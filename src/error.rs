//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration problems to
//! failed instrument calls.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically TOML syntax or type mismatches
//!   in the configuration file or environment overrides.
//! - **`Configuration`**: Semantic errors in the configuration that parse fine but are
//!   logically invalid (unknown log level, missing serial port for a real instrument).
//! - **`InvalidArgument`**: A configuration input rejected synchronously by the
//!   acquisition controller (non-finite value, zero sweep step). Nothing is mutated.
//! - **`Acquisition`**: An instrument call failed during a trigger or tick. The
//!   controller leaves the sample log and sweep state untouched so the next tick can
//!   retry. A malformed instrument response is a subtype of this variant, see
//!   [`DaqError::is_malformed_response`].
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types,
//! keeping the `?` operator usable throughout the crate.

use crate::hardware::InstrumentError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Top-level error for the library and the CLI.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration sources could not be read or merged
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Caller input rejected; no state was changed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Instrument call failed during a source or measure step
    #[error("Acquisition failed: {cause}")]
    Acquisition {
        /// Driver error that aborted the step
        #[source]
        cause: InstrumentError,
    },

    /// File system error (config output, exports)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "storage_csv")]
    /// Sample log could not be written as CSV
    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    /// The actor task has stopped; the request was not handled
    #[error("Acquisition actor is no longer running")]
    ActorStopped,
}

impl DaqError {
    /// True when the underlying instrument returned data that could not be parsed.
    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            DaqError::Acquisition {
                cause: InstrumentError::MalformedResponse { .. } | InstrumentError::EmptyResponse { .. }
            }
        )
    }

    /// True for errors after which the next timer tick may safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DaqError::Acquisition { .. })
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

impl From<InstrumentError> for DaqError {
    fn from(value: InstrumentError) -> Self {
        match value {
            InstrumentError::InvalidArgument(msg) => DaqError::InvalidArgument(msg),
            cause => DaqError::Acquisition { cause },
        }
    }
}
