//! Lab time.
//!
//! The simulated lab integrates its model up to "lab time", which can run
//! faster than wall time (`SystemClock::with_rate`) or be stepped by hand
//! (`ManualClock`). `Ticker` turns either clock into a fixed-period loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A source of lab time in seconds.
pub trait LabClock {
    /// Seconds of lab time since the clock started.
    fn now(&self) -> f64;

    /// Block for `secs` of lab time.
    fn sleep(&self, secs: f64);
}

/// Wall clock scaled by a speedup rate
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
    rate: f64,
}

impl SystemClock {
    /// Real-time clock starting now.
    pub fn new() -> Self {
        Self::with_rate(1.0)
    }

    /// Clock running `rate` times faster than wall time.
    ///
    /// Non-positive or non-finite rates fall back to real time.
    pub fn with_rate(rate: f64) -> Self {
        let rate = if rate.is_finite() && rate > 0.0 { rate } else { 1.0 };
        Self {
            start: Instant::now(),
            rate,
        }
    }

    /// The speedup rate.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LabClock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * self.rate
    }

    fn sleep(&self, secs: f64) {
        if secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(secs / self.rate));
        }
    }
}

/// Manually advanced clock; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock at lab time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jump to an absolute lab time.
    pub fn set(&self, secs: f64) {
        self.bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    /// Move lab time forward.
    pub fn advance(&self, secs: f64) {
        if secs > 0.0 {
            self.set(self.now() + secs);
        }
    }
}

impl LabClock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    fn sleep(&self, secs: f64) {
        self.advance(secs);
    }
}

/// Iterator over lab-time ticks spaced `period` seconds apart.
///
/// Each call to `next` sleeps on the clock until the next tick is due and
/// yields the elapsed lab time. Ticks that are already late are yielded
/// immediately; the schedule does not drift.
pub struct Ticker<'a, C: LabClock + ?Sized> {
    clock: &'a C,
    period: f64,
    start: f64,
    end: Option<f64>,
    tick: u64,
}

impl<'a, C: LabClock + ?Sized> Ticker<'a, C> {
    /// Ticks at `0, period, 2·period, ...` relative to the current lab time.
    pub fn new(clock: &'a C, period: f64) -> Self {
        Self {
            clock,
            period: period.max(f64::EPSILON),
            start: clock.now(),
            end: None,
            tick: 0,
        }
    }

    /// Stop after `duration` seconds of lab time (inclusive).
    pub fn until(mut self, duration: f64) -> Self {
        self.end = Some(duration);
        self
    }
}

impl<C: LabClock + ?Sized> Iterator for Ticker<'_, C> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let due = self.tick as f64 * self.period;
        if let Some(end) = self.end {
            // Small tolerance so 0.1-second periods still reach the end
            if due > end + self.period * 1e-9 {
                return None;
            }
        }

        let elapsed = self.clock.now() - self.start;
        if due > elapsed {
            self.clock.sleep(due - elapsed);
        }
        self.tick += 1;
        Some(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(2.5);
        assert_eq!(other.now(), 2.5);
        other.sleep(0.5);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_manual_clock_ignores_negative_advance() {
        let clock = ManualClock::new();
        clock.advance(-1.0);
        assert_eq!(clock.now(), 0.0);
    }

    #[test]
    fn test_system_clock_rate_fallback() {
        assert_eq!(SystemClock::with_rate(0.0).rate(), 1.0);
        assert_eq!(SystemClock::with_rate(10.0).rate(), 10.0);
    }

    #[test]
    fn test_system_clock_scales_time() {
        let clock = SystemClock::with_rate(100.0);
        clock.sleep(1.0); // 10 ms of wall time
        assert!(clock.now() >= 1.0);
    }

    #[test]
    fn test_ticker_advances_manual_clock() {
        let clock = ManualClock::new();
        let ticks: Vec<f64> = Ticker::new(&clock, 1.0).until(3.0).collect();
        assert_eq!(ticks, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn test_ticker_does_not_sleep_when_late() {
        let clock = ManualClock::new();
        let mut ticker = Ticker::new(&clock, 1.0);
        assert_eq!(ticker.next(), Some(0.0));
        clock.advance(5.0);
        assert_eq!(ticker.next(), Some(1.0));
        assert_eq!(clock.now(), 5.0);
    }
}
