use std::time::Duration;

use crate::probe::Stats;

/// Running totals over every attempt of one run.
#[derive(Debug, Clone)]
pub struct Aggregate {
    total: u64,
    succeeded: u64,
    min: Duration,
    max: Duration,
    sum: Duration,
}

impl Default for Aggregate {
    fn default() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            min: Duration::MAX,
            max: Duration::ZERO,
            sum: Duration::ZERO,
        }
    }
}

impl Aggregate {
    /// Fold one attempt in. Failed attempts still count towards the trip times.
    pub fn record(&mut self, stats: &Stats) {
        self.total += 1;
        if stats.connected {
            self.succeeded += 1;
        }
        self.min = self.min.min(stats.duration);
        self.max = self.max.max(stats.duration);
        self.sum = self.sum.saturating_add(stats.duration);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn failed(&self) -> u64 {
        self.total - self.succeeded
    }

    pub fn minimum(&self) -> Duration {
        if self.total == 0 {
            Duration::ZERO
        } else {
            self.min
        }
    }

    pub fn maximum(&self) -> Duration {
        self.max
    }

    pub fn average(&self) -> Duration {
        if self.total == 0 {
            return Duration::ZERO;
        }
        // Durations divide by u32; spread larger counts over nanoseconds.
        match u32::try_from(self.total) {
            Ok(n) => self.sum / n,
            Err(_) => Duration::from_nanos((self.sum.as_nanos() / u128::from(self.total)) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(connected: bool, millis: u64) -> Stats {
        Stats {
            connected,
            duration: Duration::from_millis(millis),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty() {
        let agg = Aggregate::default();
        assert_eq!(agg.total(), 0);
        assert_eq!(agg.failed(), 0);
        assert_eq!(agg.minimum(), Duration::ZERO);
        assert_eq!(agg.maximum(), Duration::ZERO);
        assert_eq!(agg.average(), Duration::ZERO);
    }

    #[test]
    fn test_mixed_attempts() {
        let mut agg = Aggregate::default();
        agg.record(&attempt(true, 10));
        agg.record(&attempt(false, 40));
        agg.record(&attempt(true, 20));
        agg.record(&attempt(true, 30));

        assert_eq!(agg.total(), 4);
        assert_eq!(agg.succeeded(), 3);
        assert_eq!(agg.failed(), 1);
        assert_eq!(agg.minimum(), Duration::from_millis(10));
        assert_eq!(agg.maximum(), Duration::from_millis(40));
        assert_eq!(agg.average(), Duration::from_millis(25));
    }

    #[test]
    fn test_all_failed_still_tracks_times() {
        let mut agg = Aggregate::default();
        agg.record(&attempt(false, 1000));
        agg.record(&attempt(false, 1000));
        assert_eq!(agg.succeeded(), 0);
        assert_eq!(agg.failed(), 2);
        assert_eq!(agg.minimum(), Duration::from_secs(1));
        assert_eq!(agg.average(), Duration::from_secs(1));
    }
}
