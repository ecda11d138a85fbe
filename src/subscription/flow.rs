//! Credit-based flow control with hysteresis.

/// Tracks bytes handed to a consumer but not yet acknowledged.
///
/// Delivery pauses once outstanding bytes exceed the high-water mark and
/// resumes only after acknowledgements bring them down to the low-water
/// mark, so a consumer hovering near the limit does not flap.
#[derive(Debug, Clone)]
pub(crate) struct FlowControl {
    high_water: u64,
    low_water: u64,
    outstanding: u64,
    paused: bool,
}

impl FlowControl {
    pub(crate) fn new(high_water: u64, low_water: u64) -> Self {
        Self {
            high_water,
            low_water: low_water.min(high_water),
            outstanding: 0,
            paused: false,
        }
    }

    pub(crate) fn outstanding(&self) -> u64 {
        self.outstanding
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    /// Record a delivery. Returns true if this delivery paused the flow.
    pub(crate) fn on_delivered(&mut self, bytes: u64) -> bool {
        self.outstanding = self.outstanding.saturating_add(bytes);
        if !self.paused && self.outstanding > self.high_water {
            self.paused = true;
            return true;
        }
        false
    }

    /// Return credit. Returns true if this acknowledgement resumed the flow.
    pub(crate) fn acknowledge(&mut self, bytes: u64) -> bool {
        self.outstanding = self.outstanding.saturating_sub(bytes);
        if self.paused && self.outstanding <= self.low_water {
            self.paused = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pauses_above_high_water() {
        let mut flow = FlowControl::new(100, 50);
        assert!(!flow.on_delivered(60));
        assert!(!flow.on_delivered(40));
        assert!(!flow.is_paused());

        assert!(flow.on_delivered(1));
        assert!(flow.is_paused());
        assert_eq!(flow.outstanding(), 101);
    }

    #[test]
    fn test_resumes_at_low_water_not_before() {
        let mut flow = FlowControl::new(100, 50);
        flow.on_delivered(150);
        assert!(flow.is_paused());

        assert!(!flow.acknowledge(60));
        assert!(flow.is_paused());

        assert!(flow.acknowledge(40));
        assert!(!flow.is_paused());
        assert_eq!(flow.outstanding(), 50);
    }

    #[test]
    fn test_over_acknowledge_saturates() {
        let mut flow = FlowControl::new(10, 5);
        flow.on_delivered(3);
        flow.acknowledge(1_000);
        assert_eq!(flow.outstanding(), 0);
    }

    #[test]
    fn test_low_water_clamped_to_high_water() {
        let mut flow = FlowControl::new(10, 50);
        flow.on_delivered(11);
        assert!(flow.is_paused());
        assert!(flow.acknowledge(1));
    }
}
