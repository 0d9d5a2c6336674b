use serde::Serialize;
use std::time::{Duration, Instant};

/// Trait for monotonic experiment clocks. Timestamps are nanoseconds since
/// an arbitrary per-timer origin.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    fn elapsed(&self, ts: Self::Timestamp) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn frame_count(&self) -> usize;
    fn calibration_stats(&self) -> CalibrationStats;
}

/// Frame-time statistics gathered during the calibration phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationStats {
    pub average_frame_time_ns: f64,
    pub jitter_ns: f64,
    pub min_frame_time_ns: f64,
    pub max_frame_time_ns: f64,
    pub effective_fps: f64,
}

pub(crate) fn stats_from_samples(samples: &[Duration]) -> CalibrationStats {
    let times: Vec<f64> = samples.iter().map(|d| d.as_nanos() as f64).collect();
    if times.is_empty() {
        return CalibrationStats {
            average_frame_time_ns: 0.0,
            jitter_ns: 0.0,
            min_frame_time_ns: 0.0,
            max_frame_time_ns: 0.0,
            effective_fps: 0.0,
        };
    }
    let avg = times.iter().sum::<f64>() / times.len() as f64;
    let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    CalibrationStats {
        average_frame_time_ns: avg,
        jitter_ns: var.sqrt(),
        min_frame_time_ns: min,
        max_frame_time_ns: max,
        effective_fps: if avg > 0.0 { 1e9 / avg } else { 0.0 },
    }
}

/// Wall-clock timer backed by `Instant`, with platform high-precision sleep.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    start: Instant,
    frame_times: Vec<Duration>,
    max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;

    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }

    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.remove(0);
        }
        self.frame_times.push(d);
    }

    fn frame_count(&self) -> usize {
        self.frame_times.len()
    }

    fn calibration_stats(&self) -> CalibrationStats {
        stats_from_samples(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_times: Vec::with_capacity(1000),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::CloseHandle;
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, SetWaitableTimer, WaitForSingleObject,
        };

        unsafe {
            if let Ok(timer) = CreateWaitableTimerW(None, true, None) {
                // Relative due time in 100 ns intervals.
                let due_time = -(duration.as_nanos() as i64 / 100);
                if SetWaitableTimer(timer, &due_time, 0, None, None, false).is_ok() {
                    WaitForSingleObject(timer, u32::MAX);
                }
                let _ = CloseHandle(timer);
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t};

        // Spin only for sub-100us waits; the scheduler is accurate enough above.
        if duration.as_nanos() < 100_000 {
            unsafe {
                let start = mach_absolute_time();
                let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
                mach_timebase_info(&mut timebase);

                let target_ticks =
                    duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;

                while mach_absolute_time() - start < target_ticks {
                    std::hint::spin_loop();
                }
            }
        } else {
            std::thread::sleep(duration);
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stats_over_known_samples() {
        let samples = vec![Duration::from_millis(10), Duration::from_millis(20)];
        let stats = stats_from_samples(&samples);
        assert_eq!(stats.average_frame_time_ns, 15e6);
        assert_eq!(stats.jitter_ns, 5e6);
        assert_eq!(stats.min_frame_time_ns, 10e6);
        assert_eq!(stats.max_frame_time_ns, 20e6);
        assert!((stats.effective_fps - 1e9 / 15e6).abs() < 1e-9);
    }

    #[test]
    fn stats_of_no_samples_are_zero() {
        let stats = stats_from_samples(&[]);
        assert_eq!(stats.average_frame_time_ns, 0.0);
        assert_eq!(stats.effective_fps, 0.0);
    }

    #[test]
    fn sample_window_is_bounded() {
        let mut timer = HighPrecisionTimer::new();
        for _ in 0..1200 {
            timer.record_frame(Duration::from_millis(16));
        }
        assert_eq!(timer.frame_count(), 1000);
    }
}
