use rand::Rng;

/// Simulated link quality applied by the in-memory broker to data frames.
/// Control events (open, close, error) are never dropped.
#[derive(Debug, Clone, Default)]
pub struct LinkConditions {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl LinkConditions {
    pub fn lossy(loss_percent: f32) -> Self {
        Self {
            enabled: true,
            loss_percent,
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl LinkStats {
    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
    }

    pub fn merge(&mut self, other: &LinkStats) {
        self.frames_sent += other.frames_sent;
        self.frames_received += other.frames_received;
        self.frames_dropped += other.frames_dropped;
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_conditions_never_drop() {
        let conditions = LinkConditions {
            enabled: false,
            loss_percent: 100.0,
        };
        assert!((0..100).all(|_| !conditions.should_drop()));
    }

    #[test]
    fn total_loss_always_drops() {
        let conditions = LinkConditions::lossy(100.0);
        assert!((0..100).all(|_| conditions.should_drop()));
    }

    #[test]
    fn merge_accumulates() {
        let mut total = LinkStats::default();
        let mut link = LinkStats::default();
        link.record_sent(10);
        link.record_received(4);
        total.merge(&link);
        total.merge(&link);
        assert_eq!(total.frames_sent, 2);
        assert_eq!(total.bytes_received, 8);
    }
}
