//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading.
//! Configuration is loaded from:
//! 1. `config/smu.toml` (base configuration, optional)
//! 2. Environment variables (prefixed with `SMU_DAQ_`, sections split on `__`)
//!
//! Every field has a default, so an empty or missing file yields a working
//! mock-instrument setup.
//!
//! # Example
//! ```no_run
//! use smu_daq::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // SMU_DAQ_ACQUISITION__SWEEP__STEP=0.5 overrides the file
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Instrument driver: {:?}", settings.instrument.driver);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::acquisition::{Mode, SweepSpec};
use crate::error::{AppResult, DaqError};
use crate::hardware::{IvModel, SourceKind};

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/smu.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationSettings,
    /// Instrument selection and transport parameters
    #[serde(default)]
    pub instrument: InstrumentSettings,
    /// Acquisition controller start-up state
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which SMU backend to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Deterministic simulated instrument
    #[default]
    Mock,
    /// Keithley 2400 over serial (optionally through a Prologix GPIB-USB controller)
    Keithley2400,
}

/// Instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSettings {
    /// Which driver backs the SMU
    #[serde(default)]
    pub driver: DriverKind,
    /// Serial port path, required for physical instruments
    #[serde(default)]
    pub port: Option<String>,
    /// Serial baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Transport read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// GPIB address when the port is a Prologix controller
    #[serde(default)]
    pub gpib_address: Option<u8>,
    /// Compliance limit on the measured quantity
    #[serde(default = "default_compliance")]
    pub compliance: f64,
    /// Simulated IV curve used by the mock driver
    #[serde(default)]
    pub model: IvModel,
}

/// Acquisition controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    /// Mode at startup
    #[serde(default)]
    pub mode: Mode,
    /// Sourced quantity at startup
    #[serde(default)]
    pub source_kind: SourceKind,
    /// Initial manual knob value
    #[serde(default)]
    pub knob: f64,
    /// Timer period while no sweep is armed or running
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Clear the sample log whenever mode or source kind changes. Off by
    /// default so curves from different configurations stay overlaid.
    #[serde(default = "default_clear_on_reconfigure")]
    pub clear_on_reconfigure: bool,
    /// Capacity of the controller's event queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Initial sweep parameters
    #[serde(default)]
    pub sweep: SweepSpec,
}

// Default value functions
fn default_name() -> String {
    "SMU DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_compliance() -> f64 {
    0.001
}

fn default_idle_poll_ms() -> u64 {
    1_000_000
}

fn default_clear_on_reconfigure() -> bool {
    false
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            gpib_address: None,
            compliance: default_compliance(),
            model: IvModel::default(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            source_kind: SourceKind::default(),
            knob: 0.0,
            idle_poll_ms: default_idle_poll_ms(),
            clear_on_reconfigure: default_clear_on_reconfigure(),
            queue_capacity: default_queue_capacity(),
            sweep: SweepSpec::default(),
        }
    }
}

impl Settings {
    /// Load configuration from `config/smu.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `SMU_DAQ_`.
    /// Example: `SMU_DAQ_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults fill every field.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::figment(path.as_ref())
            .merge(Env::prefixed("SMU_DAQ_").split("__"))
            .extract()
            .map_err(DaqError::from)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(path))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let instrument = &self.instrument;
        if instrument.driver == DriverKind::Keithley2400 && instrument.port.is_none() {
            return Err(DaqError::Configuration(
                "instrument.port is required for the keithley2400 driver".into(),
            ));
        }
        if !instrument.compliance.is_finite() || instrument.compliance <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Invalid compliance {}. Must be positive",
                instrument.compliance
            )));
        }
        instrument.model.validate().map_err(DaqError::Configuration)?;

        let acquisition = &self.acquisition;
        if !acquisition.knob.is_finite() {
            return Err(DaqError::Configuration(format!(
                "Invalid knob value {}",
                acquisition.knob
            )));
        }
        if acquisition.idle_poll_ms == 0 || acquisition.queue_capacity == 0 {
            return Err(DaqError::Configuration(
                "idle_poll_ms and queue_capacity must be non-zero".into(),
            ));
        }
        acquisition.sweep.validate()?;

        Ok(())
    }

    /// Render as TOML, e.g. to seed a new configuration file.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| DaqError::Configuration(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.instrument.driver, DriverKind::Mock);
        assert_eq!(settings.acquisition.sweep.start, 1.0);
        assert_eq!(settings.acquisition.sweep.stop, 9.0);
        assert!(!settings.acquisition.clear_on_reconfigure);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings.application.name, "SMU DAQ");
        assert_eq!(settings.acquisition.idle_poll_ms, 1_000_000);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[instrument]
driver = "keithley2400"
port = "/dev/ttyUSB0"
gpib_address = 24

[acquisition]
mode = "sweep"
source_kind = "I"

[acquisition.sweep]
start = 0.0
stop = 3.0
step = 0.25
dwell_millis = 200
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.application.log_level, "debug");
        assert_eq!(settings.instrument.driver, DriverKind::Keithley2400);
        assert_eq!(settings.instrument.gpib_address, Some(24));
        assert_eq!(settings.instrument.baud_rate, 9600);
        assert_eq!(settings.acquisition.mode, Mode::Sweep);
        assert_eq!(settings.acquisition.source_kind, SourceKind::Current);
        assert_eq!(settings.acquisition.sweep.step, 0.25);
        assert_eq!(settings.acquisition.sweep.dwell_millis, 200);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".into();
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn test_real_driver_without_port_is_invalid() {
        let mut settings = Settings::default();
        settings.instrument.driver = DriverKind::Keithley2400;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_step_is_invalid() {
        let mut settings = Settings::default();
        settings.acquisition.sweep.step = 0.0;
        assert!(matches!(
            settings.validate(),
            Err(DaqError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let settings = Settings::default();
        let rendered = settings.to_toml().unwrap();
        let parsed: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, settings);
    }
}
