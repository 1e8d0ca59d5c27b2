//! Frame Queue (C1): a bounded SPSC handoff of [`Chunk`]s between the capture
//! worker (producer) and the client thread (consumer).
//!
//! The transport itself is `rtrb`'s wait-free ring buffer. `pop_batch`'s
//! bounded wait is layered on top via a side-channel condition variable
//! (§4.1 "Blocking notification"); it does not sit on the push/pop hot path.

use crate::types::Chunk;
use parking_lot::{Condvar, Mutex};
use rtrb::{PopError, PushError, RingBuffer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wincap_telemetry::{CaptureMetrics, MetricsSnapshot};

struct NotifyChannel {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl NotifyChannel {
    fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn notify(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    /// Waits up to `timeout` for a notification; returns early if woken.
    fn wait(&self, timeout: Duration) {
        let mut guard = self.mutex.lock();
        self.condvar.wait_for(&mut guard, timeout);
    }
}

/// Producer half, owned by the capture worker thread (C3).
pub struct FrameQueueProducer {
    inner: rtrb::Producer<Chunk>,
    capacity: u32,
    notify: Arc<NotifyChannel>,
    metrics: CaptureMetrics,
}

impl FrameQueueProducer {
    /// Never blocks, never allocates. Returns `true` if the chunk was
    /// accepted; on rejection the chunk is dropped and `metrics().dropped`
    /// is incremented (§4.1 drop-newest-on-full policy).
    pub fn try_push(&mut self, chunk: Chunk) -> bool {
        match self.inner.push(chunk) {
            Ok(()) => {
                self.metrics.record_enqueued();
                let occupied = self.capacity.saturating_sub(self.inner.slots() as u32);
                self.metrics.set_current_size(occupied);
                self.notify.notify();
                true
            }
            Err(PushError::Full(_dropped)) => {
                self.metrics.record_dropped();
                false
            }
        }
    }
}

/// Consumer half, owned by the client thread.
pub struct FrameQueueConsumer {
    inner: rtrb::Consumer<Chunk>,
    notify: Arc<NotifyChannel>,
    metrics: CaptureMetrics,
}

impl FrameQueueConsumer {
    /// Returns up to `max_n` chunks, FIFO order. Blocks while the queue is
    /// empty, up to `timeout`, then returns whatever (possibly nothing) is
    /// available. `timeout == Duration::ZERO` makes this non-blocking.
    pub fn pop_batch(&mut self, max_n: u32, timeout: Duration) -> Vec<Chunk> {
        let mut out = Vec::new();
        if max_n == 0 {
            return out;
        }
        let deadline = Instant::now() + timeout;
        loop {
            while out.len() < max_n as usize {
                match self.inner.pop() {
                    Ok(chunk) => out.push(chunk),
                    Err(PopError::Empty) => break,
                }
            }
            self.metrics.set_current_size(self.inner.slots() as u32);
            if !out.is_empty() || Instant::now() >= deadline {
                return out;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return out;
            }
            self.notify.wait(remaining);
        }
    }

    pub fn size(&self) -> u32 {
        self.inner.slots() as u32
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Discards whatever remains in the queue. The Capture Engine (C3) does
    /// not call this on `stop()` — queued and flushed chunks are left for
    /// the caller to retrieve — but it's available for a caller that wants
    /// to explicitly discard a session's leftover audio.
    pub fn drain(&mut self) {
        while self.inner.pop().is_ok() {}
        self.metrics.set_current_size(0);
    }
}

/// Builds a bound producer/consumer pair sharing one [`CaptureMetrics`].
pub fn channel(capacity: usize, metrics: CaptureMetrics) -> (FrameQueueProducer, FrameQueueConsumer) {
    let (producer, consumer) = RingBuffer::<Chunk>::new(capacity);
    let notify = Arc::new(NotifyChannel::new());
    (
        FrameQueueProducer {
            inner: producer,
            capacity: capacity as u32,
            notify: notify.clone(),
            metrics: metrics.clone(),
        },
        FrameQueueConsumer {
            inner: consumer,
            notify,
            metrics,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn chunk(seq: u64) -> Chunk {
        Chunk {
            samples: StdArc::from(vec![0.0f32; 4]),
            frame_count: 2,
            sequence: seq,
            silent: false,
            timestamp_100ns: 0,
        }
    }

    #[test]
    fn push_then_pop_round_trips_in_fifo_order() {
        let (mut tx, mut rx) = channel(8, CaptureMetrics::new());
        assert!(tx.try_push(chunk(0)));
        assert!(tx.try_push(chunk(1)));
        let out = rx.pop_batch(8, Duration::ZERO);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].sequence, 0);
        assert_eq!(out[1].sequence, 1);
    }

    #[test]
    fn full_queue_drops_newest_and_increments_dropped_counter() {
        let (mut tx, rx) = channel(2, CaptureMetrics::new());
        assert!(tx.try_push(chunk(0)));
        assert!(tx.try_push(chunk(1)));
        assert!(!tx.try_push(chunk(2)));
        assert_eq!(rx.metrics().dropped, 1);
    }

    #[test]
    fn pop_batch_zero_timeout_on_empty_queue_returns_immediately() {
        let (_tx, mut rx) = channel(4, CaptureMetrics::new());
        let start = Instant::now();
        let out = rx.pop_batch(4, Duration::ZERO);
        assert!(out.is_empty());
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn pop_batch_max_n_zero_returns_empty_without_blocking() {
        let (mut tx, mut rx) = channel(4, CaptureMetrics::new());
        tx.try_push(chunk(0));
        let out = rx.pop_batch(0, Duration::from_secs(1));
        assert!(out.is_empty());
    }

    #[test]
    fn pop_batch_wakes_as_soon_as_a_chunk_is_pushed() {
        let (mut tx, mut rx) = channel(4, CaptureMetrics::new());
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.try_push(chunk(0));
        });
        let out = rx.pop_batch(4, Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn drain_empties_queue_and_resets_current_size() {
        let (mut tx, mut rx) = channel(4, CaptureMetrics::new());
        tx.try_push(chunk(0));
        tx.try_push(chunk(1));
        rx.drain();
        assert_eq!(rx.size(), 0);
        assert_eq!(rx.metrics().current_size, 0);
    }
}
