//! Append-only record of acquired samples.
//!
//! Samples are kept in acquisition order. Plotting consumes
//! [`SampleLog::sorted_by_x`], a copy ordered by source value, so the log
//! itself never reorders. Nothing is ever removed except through
//! [`SampleLog::clear`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hardware::SourceKind;

/// One source/measure pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Insertion order since the log was last cleared
    pub sequence: u64,
    /// Value applied on the sourced quantity (x)
    pub source_value: f64,
    /// Value read on the complementary quantity (y)
    pub measured_value: f64,
    /// Wall-clock time the pair was recorded
    pub timestamp: DateTime<Utc>,
}

/// Axis labels plus points ordered by x, ready for a plotting front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotData {
    /// Sourced quantity with unit, e.g. `Applied Voltage (V)`
    pub x_label: String,
    /// Measured quantity with unit
    pub y_label: String,
    /// `[source, measured]` pairs in ascending source order
    pub points: Vec<[f64; 2]>,
}

/// Samples in acquisition order, with a sequence counter that restarts on
/// [`clear`](Self::clear).
#[derive(Debug, Clone, Default)]
pub struct SampleLog {
    samples: Vec<Sample>,
    next_sequence: u64,
}

impl SampleLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Never fails; the log is unbounded.
    pub fn append(&mut self, source_value: f64, measured_value: f64) -> Sample {
        let sample = Sample {
            sequence: self.next_sequence,
            source_value,
            measured_value,
            timestamp: Utc::now(),
        };
        self.next_sequence += 1;
        self.samples.push(sample);
        sample
    }

    /// Drop every sample and restart the sequence at zero.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.next_sequence = 0;
    }

    /// Copy of the log ordered by source value. Equal x values keep their
    /// insertion order.
    pub fn sorted_by_x(&self) -> Vec<Sample> {
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.source_value.total_cmp(&b.source_value));
        sorted
    }

    /// Number of samples held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample has been recorded since the last clear.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Samples in acquisition order, as a slice.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// Most recently appended sample.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Sorted points labelled for `kind` as the sourced quantity.
    pub fn plot_data(&self, kind: SourceKind) -> PlotData {
        let measured = kind.complement();
        PlotData {
            x_label: format!("Applied {} ({})", kind.label(), kind.unit()),
            y_label: format!("Measured {} ({})", measured.label(), measured.unit()),
            points: self
                .sorted_by_x()
                .iter()
                .map(|s| [s.source_value, s.measured_value])
                .collect(),
        }
    }

    /// Write the log, in acquisition order, as CSV with a header row.
    #[cfg(feature = "storage_csv")]
    pub fn export_csv<P: AsRef<std::path::Path>>(&self, path: P) -> crate::error::AppResult<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        for sample in &self.samples {
            writer.serialize(sample)?;
        }
        writer.flush()?;
        tracing::info!(
            "Exported {} samples to {}",
            self.samples.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}
