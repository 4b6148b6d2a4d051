use picnam_core::StimulusItem;

/// A trial in progress or just completed.
#[derive(Debug, Clone)]
pub struct Trial {
    /// 0-based position in the trial order.
    pub index: usize,
    pub stimulus: StimulusItem,
    pub timestamps: TrialTimestamps,
}

/// Monotonic nanoseconds, plus the wall-clock anchor taken at trial start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialTimestamps {
    pub start: u64,
    pub start_epoch_ms: i64,
    pub stimulus_onset: Option<u64>,
    pub response_start: Option<u64>,
    pub response_end: Option<u64>,
}

impl TrialTimestamps {
    pub fn new(start: u64, start_epoch_ms: i64) -> Self {
        Self {
            start,
            start_epoch_ms,
            ..Self::default()
        }
    }

    /// Milliseconds from trial start to `ts`; unrecorded points read as 0.
    pub fn relative_ms(&self, ts: Option<u64>) -> f64 {
        ts.map_or(0.0, |t| t.saturating_sub(self.start) as f64 / 1_000_000.0)
    }

    /// Wall-clock value of `ts`, derived from the start anchor so that both
    /// clocks agree on intervals within the trial.
    pub fn epoch_ms(&self, ts: Option<u64>) -> f64 {
        self.start_epoch_ms as f64 + self.relative_ms(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_epoch_values() {
        let mut ts = TrialTimestamps::new(5_000_000_000, 1_700_000_000_000);
        ts.stimulus_onset = Some(5_000_250_000);
        ts.response_end = Some(11_000_500_000);
        assert_eq!(ts.relative_ms(ts.stimulus_onset), 0.25);
        assert_eq!(ts.relative_ms(ts.response_end), 6000.5);
        assert_eq!(ts.epoch_ms(ts.response_end), 1_700_000_006_000.5);
        assert_eq!(ts.relative_ms(ts.response_start), 0.0);
    }
}
