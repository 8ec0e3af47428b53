//! Sweep definition and the crossing test.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppResult, DaqError};

/// Relative slack, in units of `|step|`, allowed when deciding whether a
/// candidate has crossed `stop`. Absorbs `start + k * step` rounding so a stop
/// value reached exactly in real arithmetic is still sampled.
const CROSSING_TOLERANCE: f64 = 1e-9;

/// Sweep parameters: `start + k * step` for `k = 0, 1, 2, ...` until the
/// candidate crosses `stop`. `stop` itself is included when reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSpec {
    /// First source value
    pub start: f64,
    /// Last source value, inclusive when reached
    pub stop: f64,
    /// Signed increment; its sign must point from `start` to `stop`
    pub step: f64,
    /// Minimum time between successive sweep ticks
    pub dwell_millis: u64,
}

impl Default for SweepSpec {
    fn default() -> Self {
        Self {
            start: 1.0,
            stop: 9.0,
            step: 1.0,
            dwell_millis: 500,
        }
    }
}

impl SweepSpec {
    /// Build and validate a sweep.
    pub fn new(start: f64, stop: f64, step: f64, dwell_millis: u64) -> AppResult<Self> {
        let spec = Self {
            start,
            stop,
            step,
            dwell_millis,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Reject sweeps that are non-finite or would never terminate.
    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [("start", self.start), ("stop", self.stop), ("step", self.step)] {
            if !value.is_finite() {
                return Err(DaqError::InvalidArgument(format!(
                    "sweep {name} must be finite, got {value}"
                )));
            }
        }
        if self.step == 0.0 {
            return Err(DaqError::InvalidArgument("sweep step must be non-zero".into()));
        }
        let span = self.stop - self.start;
        if span != 0.0 && span.signum() != self.step.signum() {
            return Err(DaqError::InvalidArgument(format!(
                "sweep step {} points away from stop {} (start {})",
                self.step, self.stop, self.start
            )));
        }
        if self.dwell_millis == 0 {
            return Err(DaqError::InvalidArgument("sweep dwell must be positive".into()));
        }
        Ok(())
    }

    /// Source value for tick `k`. Computed from `start`, never accumulated.
    pub fn candidate(&self, k: u64) -> f64 {
        self.start + k as f64 * self.step
    }

    /// True once `candidate` lies beyond `stop` in the direction of travel.
    pub fn crossed(&self, candidate: f64) -> bool {
        let slack = self.step.abs() * CROSSING_TOLERANCE;
        if self.step > 0.0 {
            candidate > self.stop + slack
        } else {
            candidate < self.stop - slack
        }
    }

    /// Number of samples a complete sweep produces.
    ///
    /// Closed form of the crossing test: candidate `k` is sampled while
    /// `k <= (stop - start) / step + CROSSING_TOLERANCE`. The cast saturates.
    pub fn point_count(&self) -> u64 {
        let last = ((self.stop - self.start) / self.step + CROSSING_TOLERANCE).floor();
        if last < 0.0 {
            return 0;
        }
        (last as u64).saturating_add(1)
    }

    /// Every source value of a complete sweep, in order.
    pub fn values(&self) -> Vec<f64> {
        (0u64..)
            .map(|k| self.candidate(k))
            .take_while(|&v| !self.crossed(v))
            .collect()
    }

    /// Dwell as a [`Duration`].
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sweep_includes_stop() {
        let spec = SweepSpec::default();
        assert_eq!(spec.values(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(spec.point_count(), 9);
        assert!(!spec.crossed(9.0));
        assert!(spec.crossed(10.0));
    }

    #[test]
    fn test_fractional_step_reaches_stop_despite_rounding() {
        // 0.1 * 3 is 0.30000000000000004 in binary floating point.
        let spec = SweepSpec::new(0.0, 0.3, 0.1, 100).unwrap();
        assert_eq!(spec.point_count(), 4);
    }

    #[test]
    fn test_uneven_step_stops_before_stop() {
        let spec = SweepSpec::new(0.0, 1.0, 0.3, 100).unwrap();
        let values = spec.values();
        assert_eq!(values.len(), 4);
        assert!((values[3] - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_descending_sweep() {
        let spec = SweepSpec::new(5.0, 1.0, -2.0, 100).unwrap();
        assert_eq!(spec.values(), vec![5.0, 3.0, 1.0]);
        assert!(spec.crossed(-1.0));
    }

    #[test]
    fn test_single_point_sweep() {
        let spec = SweepSpec::new(2.0, 2.0, 0.5, 100).unwrap();
        assert_eq!(spec.values(), vec![2.0]);
    }

    #[test]
    fn test_validation() {
        assert!(SweepSpec::new(0.0, 1.0, 0.0, 100).is_err());
        assert!(SweepSpec::new(0.0, 1.0, -0.1, 100).is_err());
        assert!(SweepSpec::new(f64::NAN, 1.0, 0.1, 100).is_err());
        assert!(SweepSpec::new(0.0, f64::INFINITY, 0.1, 100).is_err());
        assert!(SweepSpec::new(0.0, 1.0, 0.1, 0).is_err());
        assert!(matches!(
            SweepSpec::new(0.0, 1.0, 0.0, 100),
            Err(DaqError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_point_count_matches_values() {
        let specs = [
            SweepSpec::default(),
            SweepSpec::new(0.0, 0.3, 0.1, 100).unwrap(),
            SweepSpec::new(0.0, 1.0, 0.3, 100).unwrap(),
            SweepSpec::new(5.0, 1.0, -2.0, 100).unwrap(),
            SweepSpec::new(-2.0, 2.0, 0.25, 100).unwrap(),
            SweepSpec::new(2.0, 2.0, 0.5, 100).unwrap(),
            SweepSpec::new(0.0, 20.0, 0.1, 100).unwrap(),
        ];
        for spec in specs {
            assert_eq!(spec.point_count(), spec.values().len() as u64, "{spec:?}");
        }
    }

    #[test]
    fn test_point_count_of_huge_sweep_is_immediate() {
        let started = std::time::Instant::now();
        // 2^-40, exactly representable.
        let step = 1.0 / (1u64 << 40) as f64;
        let spec = SweepSpec::new(0.0, 1.0, step, 10).unwrap();
        assert_eq!(spec.point_count(), (1u64 << 40) + 1);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_dwell_duration() {
        assert_eq!(SweepSpec::default().dwell(), Duration::from_millis(500));
    }
}
