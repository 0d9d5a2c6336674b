use crate::timer::{stats_from_samples, CalibrationStats, Timer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Deterministic clock for simulation and tests. Time moves only through
/// [`advance`](Self::advance) and `sleep`; clones share the same timeline.
#[derive(Debug, Clone, Default)]
pub struct VirtualTimer {
    now_ns: Arc<AtomicU64>,
    frame_times: Arc<Mutex<Vec<Duration>>>,
}

impl VirtualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for VirtualTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn record_frame(&mut self, d: Duration) {
        self.frame_times.lock().unwrap().push(d);
    }

    fn frame_count(&self) -> usize {
        self.frame_times.lock().unwrap().len()
    }

    fn calibration_stats(&self) -> CalibrationStats {
        stats_from_samples(&self.frame_times.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn advance_is_exact() {
        let timer = VirtualTimer::new();
        assert_eq!(timer.now(), 0);
        timer.advance(Duration::from_millis(100));
        assert_eq!(timer.now(), 100_000_000);
    }

    #[test]
    fn sleeps_accumulate() {
        let timer = VirtualTimer::new();
        let start = timer.now();
        timer.sleep(Duration::from_millis(3));
        timer.sleep(Duration::from_millis(7));
        assert_eq!(timer.elapsed(start), Duration::from_millis(10));
    }

    #[test]
    fn clones_share_time_and_frames() {
        let mut timer = VirtualTimer::new();
        let clone = timer.clone();
        clone.advance(Duration::from_secs(1));
        assert_eq!(timer.now(), clone.now());
        timer.record_frame(Duration::from_millis(16));
        assert_eq!(clone.frame_count(), 1);
    }
}
