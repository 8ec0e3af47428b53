//! Source-measure capability
//!
//! A source-measure unit applies one electrical quantity and measures its complement:
//! sourcing a voltage reads back a current, sourcing a current reads back a voltage.
//! Every SMU backend (simulated or physical) implements [`SourceMeasure`]; the
//! acquisition controller only ever talks to this trait.
//!
//! # Design Philosophy
//!
//! - Methods are async (uses #[async_trait]) and take `&self`
//! - Implementations use interior mutability (Mutex/RwLock) for channel state
//! - Errors are typed ([`InstrumentError`]) so the controller can tell a malformed
//!   response from a rejected argument
//! - No retries at this layer: failures propagate to the caller

use crate::adapters::AdapterError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised by SMU drivers.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// Non-finite or out-of-range value rejected before any I/O
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Instrument answered with nothing
    #[error("Empty response to '{query}'")]
    EmptyResponse {
        /// Query that was sent
        query: String,
    },

    /// Reply could not be parsed as a reading
    #[error("Malformed response to '{query}': '{response}'")]
    MalformedResponse {
        /// Query that was sent
        query: String,
        /// Raw reply
        response: String,
    },

    /// Driver used before its transport was connected
    #[error("Instrument not connected")]
    NotConnected,

    /// Failure in the adapter below the driver
    #[error("Transport error: {0}")]
    Transport(#[from] AdapterError),
}

/// Which physical quantity is driven. The other one is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Source voltage, measure current
    #[serde(rename = "V", alias = "v", alias = "voltage")]
    Voltage,
    /// Source current, measure voltage
    #[serde(rename = "I", alias = "i", alias = "current")]
    Current,
}

impl SourceKind {
    /// The quantity measured while sourcing `self`.
    pub fn complement(self) -> SourceKind {
        match self {
            SourceKind::Voltage => SourceKind::Current,
            SourceKind::Current => SourceKind::Voltage,
        }
    }

    /// Quantity name for labels, e.g. `Voltage`.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Voltage => "Voltage",
            SourceKind::Current => "Current",
        }
    }

    /// SI unit symbol.
    pub fn unit(self) -> &'static str {
        match self {
            SourceKind::Voltage => "V",
            SourceKind::Current => "A",
        }
    }

    /// SCPI function mnemonic (`VOLT` / `CURR`).
    pub fn scpi_function(self) -> &'static str {
        match self {
            SourceKind::Voltage => "VOLT",
            SourceKind::Current => "CURR",
        }
    }
}

impl Default for SourceKind {
    fn default() -> Self {
        SourceKind::Voltage
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Voltage => write!(f, "V"),
            SourceKind::Current => write!(f, "I"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v" | "volt" | "voltage" => Ok(SourceKind::Voltage),
            "i" | "curr" | "current" => Ok(SourceKind::Current),
            other => Err(InstrumentError::InvalidArgument(format!(
                "source kind must be 'V' or 'I', got '{other}'"
            ))),
        }
    }
}

/// Snapshot of an SMU channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelState {
    /// Quantity currently driven, if the channel was configured
    pub sourcing: Option<SourceKind>,
    /// Last applied source value
    pub last_source: Option<f64>,
    /// Last voltage reading
    pub last_voltage: Option<f64>,
    /// Last current reading
    pub last_current: Option<f64>,
    /// Output relay state
    pub output_enabled: bool,
}

impl ChannelState {
    /// Last reading of the given quantity.
    pub fn last_measure(&self, channel: SourceKind) -> Option<f64> {
        match channel {
            SourceKind::Voltage => self.last_voltage,
            SourceKind::Current => self.last_current,
        }
    }

    pub(crate) fn record_measure(&mut self, channel: SourceKind, value: f64) {
        match channel {
            SourceKind::Voltage => self.last_voltage = Some(value),
            SourceKind::Current => self.last_current = Some(value),
        }
    }
}

/// Capability: Source and Measure
///
/// # Contract
/// - `configure` selects which quantity the channel drives
/// - `source` applies a value of the given kind
/// - `measure` reads one quantity
/// - `source_and_measure` applies `value` and returns the measured complement
/// - batched calls return element-wise results in input order
#[async_trait]
pub trait SourceMeasure: Send + Sync {
    /// Human-readable driver name
    fn name(&self) -> &str;

    /// Select the sourced quantity.
    async fn configure(&self, kind: SourceKind) -> Result<(), InstrumentError>;

    /// Apply `value` of the given kind.
    async fn source(&self, kind: SourceKind, value: f64) -> Result<(), InstrumentError>;

    /// Read the given quantity.
    async fn measure(&self, channel: SourceKind) -> Result<f64, InstrumentError>;

    /// Current channel state.
    async fn channel_state(&self) -> ChannelState;

    /// Apply `value` and return the measured complementary quantity.
    async fn source_and_measure(&self, kind: SourceKind, value: f64) -> Result<f64, InstrumentError> {
        if !value.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "source value must be finite, got {value}"
            )));
        }
        self.source(kind, value).await?;
        self.measure(kind.complement()).await
    }

    /// Element-wise [`source_and_measure`](Self::source_and_measure).
    ///
    /// Stops at the first failure; values already applied stay applied.
    async fn source_and_measure_batch(
        &self,
        kind: SourceKind,
        values: &[f64],
    ) -> Result<Vec<f64>, InstrumentError> {
        let mut measured = Vec::with_capacity(values.len());
        for &value in values {
            measured.push(self.source_and_measure(kind, value).await?);
        }
        Ok(measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_kind() {
        assert_eq!("V".parse::<SourceKind>().unwrap(), SourceKind::Voltage);
        assert_eq!("i".parse::<SourceKind>().unwrap(), SourceKind::Current);
        assert_eq!(" current ".parse::<SourceKind>().unwrap(), SourceKind::Current);

        let err = "R".parse::<SourceKind>().unwrap_err();
        assert!(matches!(err, InstrumentError::InvalidArgument(_)));
    }

    #[test]
    fn test_complement_and_units() {
        assert_eq!(SourceKind::Voltage.complement(), SourceKind::Current);
        assert_eq!(SourceKind::Current.complement(), SourceKind::Voltage);
        assert_eq!(SourceKind::Voltage.unit(), "V");
        assert_eq!(SourceKind::Current.complement().unit(), "V");
        assert_eq!(SourceKind::Current.scpi_function(), "CURR");
    }

    #[test]
    fn test_channel_state_records_per_channel() {
        let mut state = ChannelState::default();
        state.record_measure(SourceKind::Current, 3.2);
        assert_eq!(state.last_measure(SourceKind::Current), Some(3.2));
        assert_eq!(state.last_measure(SourceKind::Voltage), None);
    }

    #[test]
    fn test_source_kind_serde_uses_short_names() {
        let json = serde_json::to_string(&SourceKind::Current).unwrap();
        assert_eq!(json, "\"I\"");
        let kind: SourceKind = serde_json::from_str("\"voltage\"").unwrap();
        assert_eq!(kind, SourceKind::Voltage);
    }
}
