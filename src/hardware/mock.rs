//! Mock SMU
//!
//! Simulated source-measure unit for running the front end without a physical
//! instrument. Readings follow a closed-form single-diode solar cell model, so
//! every measurement is deterministic and reproducible in tests.
//!
//! # IV Model
//!
//! ```text
//! I(V) = (1 - C1 * (exp(V / (C2 * Voc)) - 1)) * Isc      for V < Voc
//! V(I) = C2 * Voc * ln(1 + (1 - I / Isc) / C1)           for I < Isc
//! 0                                                      otherwise
//! ```
//!
//! Default constants: Voc = 20.5 V, Isc = 3.45 A, C1 = 2.694e-6, C2 = 0.077976842.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::adapters::AdapterError;
use crate::hardware::capabilities::{ChannelState, InstrumentError, SourceKind, SourceMeasure};

/// Parameters of the simulated IV curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvModel {
    /// Open-circuit voltage (V)
    #[serde(default = "default_voc")]
    pub voc: f64,
    /// Short-circuit current (A)
    #[serde(default = "default_isc")]
    pub isc: f64,
    /// Diode saturation coefficient (A)
    #[serde(default = "default_c1")]
    pub c1: f64,
    /// Diode exponent coefficient (1/V)
    #[serde(default = "default_c2")]
    pub c2: f64,
}

fn default_voc() -> f64 {
    20.5
}

fn default_isc() -> f64 {
    3.45
}

fn default_c1() -> f64 {
    2.694e-6
}

fn default_c2() -> f64 {
    0.077976842
}

impl Default for IvModel {
    fn default() -> Self {
        Self {
            voc: default_voc(),
            isc: default_isc(),
            c1: default_c1(),
            c2: default_c2(),
        }
    }
}

impl IvModel {
    /// Measured complement of `value` sourced as `kind`.
    pub fn evaluate(&self, kind: SourceKind, value: f64) -> f64 {
        match kind {
            SourceKind::Voltage if value < self.voc => {
                (1.0 - self.c1 * ((value / (self.c2 * self.voc)).exp() - 1.0)) * self.isc
            }
            SourceKind::Current if value < self.isc => {
                self.c2 * self.voc * (1.0 + (1.0 - value / self.isc) / self.c1).ln()
            }
            // Out of range
            _ => 0.0,
        }
    }

    /// Element-wise [`evaluate`](Self::evaluate).
    pub fn evaluate_batch(&self, kind: SourceKind, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.evaluate(kind, v)).collect()
    }

    /// Reject constants that would make the curve undefined.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("voc", self.voc),
            ("isc", self.isc),
            ("c1", self.c1),
            ("c2", self.c2),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("IV model constant {name} must be positive, got {value}"));
            }
        }
        Ok(())
    }
}

/// Mock SMU with a deterministic IV response
///
/// # Example
///
/// ```rust,ignore
/// let smu = MockSmu::new();
/// let current = smu.source_and_measure(SourceKind::Voltage, 5.0).await?;
/// assert!((current - 3.45).abs() < 0.01);
/// ```
pub struct MockSmu {
    model: IvModel,
    state: RwLock<ChannelState>,
    should_fail_next: AtomicBool,
    operation_count: AtomicU64,
}

impl MockSmu {
    /// Create a mock SMU with the default solar cell model
    pub fn new() -> Self {
        Self::with_model(IvModel::default())
    }

    /// Create a mock SMU following `model`.
    pub fn with_model(model: IvModel) -> Self {
        Self {
            model,
            state: RwLock::new(ChannelState::default()),
            should_fail_next: AtomicBool::new(false),
            operation_count: AtomicU64::new(0),
        }
    }

    /// The simulated IV curve.
    pub fn model(&self) -> &IvModel {
        &self.model
    }

    /// Make the next `source` or `measure` call fail like a dropped link.
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of `source`/`measure` calls that reached the device.
    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), InstrumentError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail_next.swap(false, Ordering::SeqCst) {
            return Err(InstrumentError::Transport(AdapterError::QueryFailed(
                "MockSmu: injected failure".into(),
            )));
        }
        Ok(())
    }
}

impl Default for MockSmu {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceMeasure for MockSmu {
    fn name(&self) -> &str {
        "Mock SMU"
    }

    async fn configure(&self, kind: SourceKind) -> Result<(), InstrumentError> {
        let mut state = self.state.write().await;
        state.sourcing = Some(kind);
        state.output_enabled = true;
        debug!("MockSmu: sourcing {}", kind.label());
        Ok(())
    }

    async fn source(&self, kind: SourceKind, value: f64) -> Result<(), InstrumentError> {
        self.check_failure()?;
        let mut state = self.state.write().await;
        state.sourcing = Some(kind);
        state.last_source = Some(value);
        debug!("MockSmu: source {} = {:.6} {}", kind.label(), value, kind.unit());
        Ok(())
    }

    async fn measure(&self, channel: SourceKind) -> Result<f64, InstrumentError> {
        self.check_failure()?;
        let mut state = self.state.write().await;

        let reading = match state.sourcing {
            // Reading back the driven quantity returns the setpoint.
            Some(kind) if kind == channel => state.last_source.unwrap_or(0.0),
            Some(kind) => self.model.evaluate(kind, state.last_source.unwrap_or(0.0)),
            None => 0.0,
        };

        state.record_measure(channel, reading);
        debug!("MockSmu: measured {} = {:.6} {}", channel.label(), reading, channel.unit());
        Ok(reading)
    }

    async fn channel_state(&self) -> ChannelState {
        *self.state.read().await
    }

    async fn source_and_measure_batch(
        &self,
        kind: SourceKind,
        values: &[f64],
    ) -> Result<Vec<f64>, InstrumentError> {
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(InstrumentError::InvalidArgument(format!(
                "source value must be finite, got {bad}"
            )));
        }
        self.check_failure()?;

        let measured = self.model.evaluate_batch(kind, values);
        let mut state = self.state.write().await;
        state.sourcing = Some(kind);
        if let (Some(&last_in), Some(&last_out)) = (values.last(), measured.last()) {
            state.last_source = Some(last_in);
            state.record_measure(kind.complement(), last_out);
        }
        Ok(measured)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
