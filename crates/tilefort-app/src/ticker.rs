//! Fixed-rate update driver.
//!
//! [`Ticker::run`] calls its update callback at most once per interval,
//! sleeping in between. A slow update is not caught up with extra calls; the
//! next call simply reports a longer elapsed time, clamped to `max_elapsed`
//! so one stall cannot produce a huge step.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Timing passed to every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickTime {
    /// Time since the previous update, clamped.
    pub elapsed: Duration,
    /// Sum of every reported `elapsed`.
    pub total: Duration,
}

/// Cloneable flag that ends [`Ticker::run`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Asks the ticker to return after the current update.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`stop`](Self::stop) was called on any clone.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Turns measured frame times into [`TickTime`]s.
#[derive(Debug, Clone)]
pub struct TickClock {
    max_elapsed: Duration,
    total: Duration,
    count: u64,
}

impl TickClock {
    /// A clock that clamps each step to `max_elapsed`.
    pub fn new(max_elapsed: Duration) -> Self {
        Self {
            max_elapsed,
            total: Duration::ZERO,
            count: 0,
        }
    }

    /// Records one update after `elapsed` wall time.
    pub fn advance(&mut self, elapsed: Duration) -> TickTime {
        let elapsed = if elapsed > self.max_elapsed {
            tracing::warn!(
                "Tick took {:.1}ms, clamping to {:.1}ms",
                elapsed.as_secs_f64() * 1000.0,
                self.max_elapsed.as_secs_f64() * 1000.0
            );
            self.max_elapsed
        } else {
            elapsed
        };
        self.total += elapsed;
        self.count += 1;
        TickTime {
            elapsed,
            total: self.total,
        }
    }

    /// Number of updates recorded.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of the clamped elapsed times.
    pub fn total(&self) -> Duration {
        self.total
    }
}

/// Drives an update callback at a fixed rate on the calling thread.
pub struct Ticker {
    interval: Duration,
    clock: TickClock,
    stop: StopHandle,
}

impl Ticker {
    /// A ticker targeting one update per `interval`.
    pub fn new(interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            interval,
            clock: TickClock::new(max_elapsed),
            stop: StopHandle::default(),
        }
    }

    /// A ticker targeting `rate` updates per second. Zero runs unthrottled.
    pub fn with_rate(rate: u32, max_elapsed: Duration) -> Self {
        let interval = if rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / rate
        };
        Self::new(interval, max_elapsed)
    }

    /// Handle that makes [`run`](Self::run) return after the current update.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Target time between updates.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Timing recorded so far.
    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    /// Calls `update` once per interval until stopped.
    pub fn run(&mut self, mut update: impl FnMut(TickTime)) {
        let mut previous = Instant::now();
        while !self.stop.is_stopped() {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
                continue;
            }
            previous = Instant::now();
            update(self.clock.advance(elapsed));
        }
        tracing::debug!("Ticker stopped after {} updates", self.clock.count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_millis(250);

    #[test]
    fn test_clock_accumulates() {
        let mut clock = TickClock::new(MAX);
        clock.advance(Duration::from_millis(25));
        let time = clock.advance(Duration::from_millis(30));
        assert_eq!(time.elapsed, Duration::from_millis(30));
        assert_eq!(time.total, Duration::from_millis(55));
        assert_eq!(clock.count(), 2);
    }

    #[test]
    fn test_clock_clamps_long_ticks() {
        let mut clock = TickClock::new(MAX);
        let time = clock.advance(Duration::from_secs(3));
        assert_eq!(time.elapsed, MAX);
        assert_eq!(clock.total(), MAX);
    }

    #[test]
    fn test_zero_elapsed() {
        let mut clock = TickClock::new(MAX);
        assert_eq!(clock.advance(Duration::ZERO), TickTime::default());
    }

    #[test]
    fn test_rate_to_interval() {
        assert_eq!(Ticker::with_rate(40, MAX).interval(), Duration::from_millis(25));
        assert_eq!(Ticker::with_rate(0, MAX).interval(), Duration::ZERO);
    }

    #[test]
    fn test_run_stops_from_inside_update() {
        let mut ticker = Ticker::new(Duration::from_millis(2), MAX);
        let stop = ticker.stop_handle();
        let mut calls = 0;
        ticker.run(|_| {
            calls += 1;
            if calls == 5 {
                stop.stop();
            }
        });
        assert_eq!(calls, 5);
        assert_eq!(ticker.clock().count(), 5);
    }

    #[test]
    fn test_run_respects_interval() {
        let interval = Duration::from_millis(10);
        let mut ticker = Ticker::new(interval, MAX);
        let stop = ticker.stop_handle();
        let mut times = Vec::new();
        let started = Instant::now();
        ticker.run(|time| {
            times.push(time);
            if times.len() == 4 {
                stop.stop();
            }
        });

        assert!(started.elapsed() >= interval * 4);
        assert!(times.iter().all(|t| t.elapsed >= interval));
        assert_eq!(times[3].total, ticker.clock().total());
    }

    #[test]
    fn test_stop_from_another_thread() {
        let mut ticker = Ticker::new(Duration::from_millis(1), MAX);
        let stop = ticker.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            stop.stop();
        });
        ticker.run(|_| {});
        stopper.join().unwrap();
        assert!(ticker.clock().count() > 0);
    }
}
