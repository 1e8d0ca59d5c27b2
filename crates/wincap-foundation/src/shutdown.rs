//! A cooperative stop signal: an atomic flag plus a condvar, so a thread blocked
//! waiting on a timeout can be woken immediately instead of waiting out the full
//! period before it next checks the flag (§5: "the worker is joined on stop").

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

struct Inner {
    flag: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: AtomicBool::new(false),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Requests shutdown and wakes any thread parked in `wait_timeout`.
    pub fn signal(&self) {
        self.inner.flag.store(true, Ordering::Release);
        let _guard = self.inner.mutex.lock();
        self.inner.condvar.notify_all();
    }

    pub fn is_signaled(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Clears the flag so the same signal can be reused across a
    /// subsequent `start`/`stop` cycle.
    pub fn reset(&self) {
        self.inner.flag.store(false, Ordering::Release);
    }

    /// Blocks until either shutdown is signaled or `timeout` elapses, whichever
    /// comes first. Returns `true` if shutdown was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_signaled() {
            return true;
        }
        let mut guard = self.inner.mutex.lock();
        if self.is_signaled() {
            return true;
        }
        self.inner.condvar.wait_for(&mut guard, timeout);
        self.is_signaled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_observed_immediately() {
        let s = ShutdownSignal::new();
        assert!(!s.is_signaled());
        s.signal();
        assert!(s.is_signaled());
    }

    #[test]
    fn wait_timeout_returns_true_once_signaled_from_another_thread() {
        let s = ShutdownSignal::new();
        let s2 = s.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            s2.signal();
        });
        let woke_due_to_signal = s.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(woke_due_to_signal);
    }

    #[test]
    fn reset_allows_the_signal_to_be_reused() {
        let s = ShutdownSignal::new();
        s.signal();
        assert!(s.is_signaled());
        s.reset();
        assert!(!s.is_signaled());
    }

    #[test]
    fn wait_timeout_elapses_without_signal() {
        let s = ShutdownSignal::new();
        let woke_due_to_signal = s.wait_timeout(Duration::from_millis(20));
        assert!(!woke_due_to_signal);
    }
}
