use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Sleep granularity while waiting for the next tick, so shutdown requests
/// are noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Fixed-interval tick scheduler owned by the capture loop.
///
/// Deadlines advance from the intended schedule, not from wall-clock
/// completion, so a slow submission does not shift every later tick. If the
/// loop falls more than one interval behind, the schedule re-anchors to now
/// instead of firing a burst of catch-up ticks.
pub struct TickScheduler {
    interval: Duration,
    next_tick: Instant,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_tick: Instant::now() + interval,
        }
    }

    /// Block until the next tick is due. Returns `false` when the shutdown
    /// flag was raised instead.
    pub fn wait(&mut self, shutdown: &AtomicBool) -> bool {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return false;
            }

            let now = Instant::now();
            if now >= self.next_tick {
                self.next_tick += self.interval;
                if self.next_tick <= now {
                    tracing::trace!("Tick schedule lagging, re-anchoring to now");
                    self.next_tick = now + self.interval;
                }
                return true;
            }

            std::thread::sleep((self.next_tick - now).min(SLEEP_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_after_the_interval() {
        let shutdown = AtomicBool::new(false);
        let mut scheduler = TickScheduler::new(Duration::from_millis(10));

        let start = Instant::now();
        assert!(scheduler.wait(&shutdown));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn shutdown_flag_cancels_the_wait() {
        let shutdown = AtomicBool::new(true);
        let mut scheduler = TickScheduler::new(Duration::from_secs(60));

        let start = Instant::now();
        assert!(!scheduler.wait(&shutdown));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn lagging_schedule_reanchors_instead_of_bursting() {
        let shutdown = AtomicBool::new(false);
        let mut scheduler = TickScheduler::new(Duration::from_millis(5));

        assert!(scheduler.wait(&shutdown));
        // Simulate a long tick body.
        std::thread::sleep(Duration::from_millis(25));

        assert!(scheduler.wait(&shutdown));
        let start = Instant::now();
        assert!(scheduler.wait(&shutdown));
        // Re-anchored: the next tick is a full interval away, not immediate.
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
