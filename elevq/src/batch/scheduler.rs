//! Fixed-interval dispatch trigger.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Default dispatch interval: both the minimum queuing delay and the poll period.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(500);

/// Periodic trigger asking the coordinator to evaluate a dispatch window.
///
/// The first tick fires one full period after [`DispatchScheduler::start`], so
/// requests always wait at least one interval to gather company. Ticks missed
/// while the driver was busy are not bursted; the schedule simply shifts.
/// Dropping the scheduler stops it.
#[derive(Debug)]
pub struct DispatchScheduler {
    interval: Interval,
}

impl DispatchScheduler {
    /// Start ticking every `period`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero; callers validate the interval beforehand.
    pub fn start(period: Duration) -> Self {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// The configured period.
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let start = Instant::now();
        let mut scheduler = DispatchScheduler::start(Duration::from_millis(500));
        assert_eq!(scheduler.period(), Duration::from_millis(500));

        scheduler.tick().await;
        let first = start.elapsed();
        assert!(first >= Duration::from_millis(500) && first < Duration::from_millis(510));

        scheduler.tick().await;
        let second = start.elapsed();
        assert!(second >= Duration::from_millis(1000) && second < Duration::from_millis(1010));
    }
}
