use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Clock used to pace a session.
///
/// `now` is monotonic and drives every interval; `epoch_ms` is the wall
/// clock, read only to anchor trial timestamps in absolute time.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds on the monotonic clock since the timer was created.
    fn now(&self) -> u64;
    /// Milliseconds since the Unix epoch on the wall clock.
    fn epoch_ms(&self) -> i64;
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration);
    /// Sleeps until the monotonic clock reaches `deadline_ns`.
    fn sleep_until(&self, deadline_ns: u64) {
        let now = self.now();
        if deadline_ns > now {
            self.sleep(Duration::from_nanos(deadline_ns - now));
        }
    }
    fn record_hold(&mut self, requested: Duration, actual: Duration);
    fn pacing_stats(&self) -> PacingStats;
}

/// How far timed holds overran their requested duration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacingStats {
    pub holds: usize,
    pub average_overshoot_ns: f64,
    pub jitter_ns: f64,
    pub min_overshoot_ns: f64,
    pub max_overshoot_ns: f64,
}

impl PacingStats {
    fn from_overshoots(overshoots: &[i64]) -> Self {
        if overshoots.is_empty() {
            return Self::default();
        }
        let times: Vec<f64> = overshoots.iter().map(|&ns| ns as f64).collect();
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        Self {
            holds: times.len(),
            average_overshoot_ns: avg,
            jitter_ns: var.sqrt(),
            min_overshoot_ns: times.iter().copied().fold(f64::INFINITY, f64::min),
            max_overshoot_ns: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

fn overshoot_ns(requested: Duration, actual: Duration) -> i64 {
    actual.as_nanos() as i64 - requested.as_nanos() as i64
}

fn push_bounded(samples: &mut Vec<i64>, max_samples: usize, value: i64) {
    if samples.len() >= max_samples {
        samples.remove(0);
    }
    samples.push(value);
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub overshoots: Vec<i64>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn epoch_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
    fn record_hold(&mut self, requested: Duration, actual: Duration) {
        push_bounded(
            &mut self.overshoots,
            self.max_samples,
            overshoot_ns(requested, actual),
        );
    }
    fn pacing_stats(&self) -> PacingStats {
        PacingStats::from_overshoots(&self.overshoots)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            overshoots: Vec::with_capacity(256),
            max_samples: 1000,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{clock_nanosleep, timespec, CLOCK_MONOTONIC, EINTR};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // clock_nanosleep returns the error number directly; resume with the
        // remainder when a signal interrupts the sleep.
        while unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) } == EINTR {
            req = rem;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock: `sleep` advances time instantly.
///
/// Clones share the same clock, so a test can keep a handle and read the
/// total session time after the state machine consumed its copy.
#[derive(Debug, Clone)]
pub struct SimulatedTimer {
    now_ns: Arc<AtomicU64>,
    epoch_base_ms: i64,
    overshoots: Vec<i64>,
}

impl SimulatedTimer {
    pub fn new() -> Self {
        Self::with_epoch(1_700_000_000_000)
    }

    pub fn with_epoch(epoch_base_ms: i64) -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(0)),
            epoch_base_ms,
            overshoots: Vec::new(),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn total_elapsed(&self) -> Duration {
        Duration::from_nanos(self.now())
    }
}

impl Default for SimulatedTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for SimulatedTimer {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn epoch_ms(&self) -> i64 {
        self.epoch_base_ms + (self.now() / 1_000_000) as i64
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_hold(&mut self, requested: Duration, actual: Duration) {
        push_bounded(&mut self.overshoots, 1000, overshoot_ns(requested, actual));
    }
    fn pacing_stats(&self) -> PacingStats {
        PacingStats::from_overshoots(&self.overshoots)
    }
}
