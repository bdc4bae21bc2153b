//! Request throttle shared by the network providers.
//!
//! Wraps a `governor` direct rate limiter: up to `burst` requests at once,
//! replenished at `max_per_minute`. Each request takes one cell, blocking
//! until one is available.

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

type Limiter<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Blocking rate limiter. `None` inside means unlimited.
pub struct Throttle<C: Clock = DefaultClock> {
    limiter: Option<Limiter<C>>,
    clock: C,
}

impl Throttle {
    /// `max_per_minute == 0` disables throttling. `burst` is clamped to at least one.
    pub fn new(max_per_minute: u32, burst: u32) -> Self {
        Self::with_clock(max_per_minute, burst, DefaultClock::default())
    }

    /// A throttle that never waits.
    pub fn unlimited() -> Self {
        Self::new(0, 1)
    }
}

impl<C: Clock> Throttle<C> {
    pub fn with_clock(max_per_minute: u32, burst: u32, clock: C) -> Self {
        let limiter = NonZeroU32::new(max_per_minute).map(|rate| {
            let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
            RateLimiter::direct_with_clock(Quota::per_minute(rate).allow_burst(burst), &clock)
        });
        Self { limiter, clock }
    }

    pub fn is_unlimited(&self) -> bool {
        self.limiter.is_none()
    }

    /// Take one cell, sleeping until one is available.
    pub fn acquire(&self) {
        while let Some(wait) = self.try_acquire() {
            tracing::debug!(?wait, "throttled");
            std::thread::sleep(wait);
        }
    }

    /// Take a cell if one is available now; otherwise return how long until
    /// one will be.
    fn try_acquire(&self) -> Option<Duration> {
        let limiter = self.limiter.as_ref()?;
        limiter
            .check()
            .err()
            .map(|not_until| not_until.wait_time_from(self.clock.now()))
    }
}

impl Default for Throttle {
    /// 60 requests per minute with a burst of 5.
    fn default() -> Self {
        Self::new(60, 5)
    }
}

impl<C: Clock> fmt::Debug for Throttle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("unlimited", &self.is_unlimited())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn fake(max_per_minute: u32, burst: u32) -> (FakeRelativeClock, Throttle<FakeRelativeClock>) {
        let clock = FakeRelativeClock::default();
        let throttle = Throttle::with_clock(max_per_minute, burst, clock.clone());
        (clock, throttle)
    }

    #[test]
    fn burst_is_available_immediately() {
        let (_clock, throttle) = fake(60, 3);
        for _ in 0..3 {
            assert_eq!(throttle.try_acquire(), None);
        }
        assert!(throttle.try_acquire().is_some());
    }

    #[test]
    fn wait_matches_refill_rate() {
        let (clock, throttle) = fake(60, 1);
        assert_eq!(throttle.try_acquire(), None);

        let wait = throttle.try_acquire().unwrap();
        assert!(wait <= Duration::from_secs(1));
        assert!(wait > Duration::from_millis(900));

        clock.advance(Duration::from_secs(1));
        assert_eq!(throttle.try_acquire(), None);
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let (clock, throttle) = fake(600, 2);
        clock.advance(Duration::from_secs(3600));
        assert_eq!(throttle.try_acquire(), None);
        assert_eq!(throttle.try_acquire(), None);
        assert!(throttle.try_acquire().is_some());
    }

    #[test]
    fn zero_burst_still_allows_one() {
        let (_clock, throttle) = fake(60, 0);
        assert_eq!(throttle.try_acquire(), None);
        assert!(throttle.try_acquire().is_some());
    }

    #[test]
    fn unlimited_never_waits() {
        let throttle = Throttle::unlimited();
        assert!(throttle.is_unlimited());
        for _ in 0..1000 {
            assert_eq!(throttle.try_acquire(), None);
        }
        throttle.acquire();
    }
}
