//! # Clock Abstraction for Test Determinism
//!
//! This module provides a Clock trait that can be implemented for both real-time
//! and virtual-time execution, enabling deterministic testing of time-dependent code.

use std::time::{Duration, Instant};

/// Clock trait for time abstraction
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> Instant;

    /// Sleep for the specified duration
    fn sleep(&self, duration: Duration);
}

/// Real-time clock implementation
pub struct RealClock;

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic testing
pub struct TestClock {
    current_time: std::sync::Mutex<Instant>,
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            current_time: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn new_with_start_time(start_time: Instant) -> Self {
        Self {
            current_time: std::sync::Mutex::new(start_time),
        }
    }

    /// Advance the virtual clock by the specified duration
    pub fn advance(&self, duration: Duration) {
        let mut time = self.current_time.lock().unwrap();
        *time += duration;
    }

    /// Set the virtual clock to a specific time
    pub fn set_time(&self, time: Instant) {
        let mut current = self.current_time.lock().unwrap();
        *current = time;
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        *self.current_time.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        // In virtual time, sleep just advances the clock
        self.advance(duration);
        // Yield to allow other tasks to run (though this is synchronous)
        std::thread::yield_now();
    }
}

/// Thread-safe clock that can be shared across threads
pub type SharedClock = std::sync::Arc<dyn Clock + Send + Sync>;

/// A bounded wait expressed against a [`Clock`] rather than a raw `Duration`,
/// so activation-timeout and worker-wait-timeout logic (§4.3, §4.4) can be
/// driven by a [`TestClock`] instead of real elapsed time.
pub struct Deadline {
    clock: SharedClock,
    expires_at: Instant,
}

impl Deadline {
    pub fn after(clock: SharedClock, timeout: Duration) -> Self {
        let expires_at = clock.now() + timeout;
        Self { clock, expires_at }
    }

    /// Time left before expiry; zero once past.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.clock.now())
    }

    pub fn remaining_millis(&self) -> u32 {
        self.remaining().as_millis().min(u32::MAX as u128) as u32
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Create a real-time clock
pub fn real_clock() -> SharedClock {
    std::sync::Arc::new(RealClock::new())
}

/// Create a test clock
pub fn test_clock() -> SharedClock {
    std::sync::Arc::new(TestClock::new())
}

/// Create a test clock with specific start time
pub fn test_clock_with_start(start_time: Instant) -> SharedClock {
    std::sync::Arc::new(TestClock::new_with_start_time(start_time))
}

#[cfg(test)]
mod deadline_tests {
    use super::*;

    #[test]
    fn remaining_shrinks_as_the_clock_advances_without_real_sleeps() {
        let clock = std::sync::Arc::new(TestClock::new());
        let shared: SharedClock = clock.clone();
        let deadline = Deadline::after(shared, Duration::from_secs(1));
        assert_eq!(deadline.remaining(), Duration::from_secs(1));

        clock.advance(Duration::from_millis(400));
        assert_eq!(deadline.remaining(), Duration::from_millis(600));
        assert!(!deadline.is_expired());
    }

    #[test]
    fn expires_once_the_clock_reaches_it_and_saturates_at_zero() {
        let clock = std::sync::Arc::new(TestClock::new());
        let shared: SharedClock = clock.clone();
        let deadline = Deadline::after(shared, Duration::from_millis(100));

        clock.advance(Duration::from_millis(250));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
