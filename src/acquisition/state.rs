//! Controller state enums.
//!
//! # State Machine
//!
//! ```text
//!                    trigger edge (SWEEP)          tick, candidate within stop
//!  INACTIVE ───────────────────────────> ARMED ─────────────────────────> RUNNING
//!     ▲                                    │                                │  │
//!     │         tick, candidate crossed    │                                │  │ tick, candidate
//!     └────────────────────────────────────┴────────────────────────────────┘  │ within stop
//!     ▲                                                                         │
//!     └──────────── mode or source kind changed ◄───────────────────────────────┘
//! ```
//!
//! [`ControllerPhase`] tracks where a single invocation is: at rest, waiting for the
//! next sweep tick, or inside the two halves of an instrument call.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DaqError;

/// Acquisition mode, chosen by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One sample per trigger edge, at the manual knob value
    #[default]
    Single,
    /// One trigger edge arms a sweep, timer ticks produce the samples
    Sweep,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Single => write!(f, "single"),
            Mode::Sweep => write!(f, "sweep"),
        }
    }
}

impl FromStr for Mode {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Mode::Single),
            "sweep" => Ok(Mode::Sweep),
            other => Err(DaqError::InvalidArgument(format!(
                "mode must be 'single' or 'sweep', got '{other}'"
            ))),
        }
    }
}

/// Sweep progress. Always `Inactive` in single mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    /// No sweep in progress
    #[default]
    Inactive,
    /// Trigger received, first tick has not produced a sample yet
    Armed,
    /// Samples are being produced on successive ticks
    Running,
}

impl SweepState {
    /// Armed or running.
    pub fn is_active(&self) -> bool {
        matches!(self, SweepState::Armed | SweepState::Running)
    }
}

impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepState::Inactive => write!(f, "Inactive"),
            SweepState::Armed => write!(f, "Armed"),
            SweepState::Running => write!(f, "Running"),
        }
    }
}

/// Where the controller is within its event cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerPhase {
    /// At rest; only a trigger edge can start an acquisition
    #[default]
    Idle,
    /// A sweep is armed or running; the next timer tick takes a sample
    AwaitingTrigger,
    /// Applying the source value
    Sourcing,
    /// Reading the complementary quantity
    Measuring,
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerPhase::Idle => write!(f, "Idle"),
            ControllerPhase::AwaitingTrigger => write!(f, "AwaitingTrigger"),
            ControllerPhase::Sourcing => write!(f, "Sourcing"),
            ControllerPhase::Measuring => write!(f, "Measuring"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("single".parse::<Mode>().unwrap(), Mode::Single);
        assert_eq!("SWEEP".parse::<Mode>().unwrap(), Mode::Sweep);
        assert!(matches!(
            "scan".parse::<Mode>(),
            Err(DaqError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_sweep_state_activity() {
        assert!(!SweepState::Inactive.is_active());
        assert!(SweepState::Armed.is_active());
        assert!(SweepState::Running.is_active());
    }

    #[test]
    fn test_display() {
        assert_eq!(Mode::Sweep.to_string(), "sweep");
        assert_eq!(SweepState::Armed.to_string(), "Armed");
        assert_eq!(ControllerPhase::Measuring.to_string(), "Measuring");
    }
}
