//! Trigger edge detection.
//!
//! The presentation layer reports its trigger control as a monotonically
//! increasing press counter, and may deliver the same counter value more than
//! once. Only an increase is a new edge.

/// How an observed counter value relates to the last committed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeObservation {
    /// Counter increased: a new trigger request
    New,
    /// Same value delivered again
    Repeated,
    /// Counter went backwards (the control was recreated)
    Rewound,
}

/// Remembers the last trigger counter value that was acted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerEdgeDetector {
    last_seen: u64,
}

impl TriggerEdgeDetector {
    /// Detector that has seen no press yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `count` without remembering it.
    pub fn classify(&self, count: u64) -> EdgeObservation {
        match count.cmp(&self.last_seen) {
            std::cmp::Ordering::Greater => EdgeObservation::New,
            std::cmp::Ordering::Equal => EdgeObservation::Repeated,
            std::cmp::Ordering::Less => EdgeObservation::Rewound,
        }
    }

    /// Remember `count` as handled.
    pub fn commit(&mut self, count: u64) {
        self.last_seen = count;
    }

    /// Classify and remember in one step. Returns true for a new edge.
    pub fn observe(&mut self, count: u64) -> bool {
        let observation = self.classify(count);
        self.commit(count);
        observation == EdgeObservation::New
    }

    /// Align with a freshly created trigger control without producing an edge.
    pub fn resync(&mut self, count: u64) {
        self.last_seen = count;
    }

    /// Last committed counter value.
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_delivery_is_not_an_edge() {
        let mut edges = TriggerEdgeDetector::new();
        assert!(edges.observe(1));
        assert!(!edges.observe(1));
        assert!(!edges.observe(1));
        assert!(edges.observe(2));
    }

    #[test]
    fn test_jump_counts_as_one_edge() {
        let mut edges = TriggerEdgeDetector::new();
        assert!(edges.observe(5));
        assert_eq!(edges.last_seen(), 5);
    }

    #[test]
    fn test_classify_does_not_commit() {
        let edges = TriggerEdgeDetector::new();
        assert_eq!(edges.classify(1), EdgeObservation::New);
        assert_eq!(edges.classify(1), EdgeObservation::New);
        assert_eq!(edges.last_seen(), 0);
    }

    #[test]
    fn test_rewound_counter_resyncs() {
        let mut edges = TriggerEdgeDetector::new();
        edges.observe(7);
        assert_eq!(edges.classify(0), EdgeObservation::Rewound);
        assert!(!edges.observe(0));
        assert!(edges.observe(1));
    }

    #[test]
    fn test_resync() {
        let mut edges = TriggerEdgeDetector::new();
        edges.resync(3);
        assert_eq!(edges.classify(3), EdgeObservation::Repeated);
        assert_eq!(edges.classify(4), EdgeObservation::New);
    }
}
