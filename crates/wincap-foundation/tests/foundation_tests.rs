//! Foundation crate tests
//!
//! Tests cover:
//! - Clock abstraction (RealClock, TestClock, SharedClock)
//! - Error types (CaptureError, DirectoryError, EngineError)
//! - Shutdown signal

use std::time::{Duration, Instant};
use wincap_foundation::clock::{real_clock, test_clock, Clock, RealClock, TestClock};
use wincap_foundation::error::{CaptureError, DirectoryError, EngineError, RecoveryStrategy};
use wincap_foundation::shutdown::ShutdownSignal;

// ─── RealClock Tests ────────────────────────────────────────────────

#[test]
fn real_clock_now_returns_current_time() {
    let clock = RealClock::new();
    let before = Instant::now();
    let clock_time = clock.now();
    let after = Instant::now();
    assert!(clock_time >= before);
    assert!(clock_time <= after);
}

#[test]
fn real_clock_factory_function() {
    let clock = real_clock();
    let t = clock.now();
    assert!(t.elapsed() < Duration::from_secs(1));
}

// ─── TestClock Tests ────────────────────────────────────────────────

#[test]
fn test_clock_advance_accumulates() {
    let clock = TestClock::new();
    let start = clock.now();
    clock.advance(Duration::from_millis(100));
    clock.advance(Duration::from_millis(200));
    clock.advance(Duration::from_millis(300));
    let elapsed = clock.now().duration_since(start);
    assert_eq!(elapsed, Duration::from_millis(600));
}

#[test]
fn test_clock_sleep_advances_time() {
    let clock = TestClock::new();
    let t0 = clock.now();
    clock.sleep(Duration::from_secs(10));
    let t1 = clock.now();
    assert_eq!(t1.duration_since(t0), Duration::from_secs(10));
}

#[test]
fn test_clock_set_time() {
    let clock = TestClock::new();
    let target = Instant::now() + Duration::from_secs(1000);
    clock.set_time(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn test_clock_factory_function() {
    let clock = test_clock();
    let t = clock.now();
    clock.sleep(Duration::from_secs(1));
    let t2 = clock.now();
    assert_eq!(t2.duration_since(t), Duration::from_secs(1));
}

// ─── Error Type Tests ───────────────────────────────────────────────

#[test]
fn capture_error_no_such_process_message() {
    let err = CaptureError::NoSuchProcess { pid: 4242 };
    let msg = format!("{}", err);
    assert!(msg.contains("4242"));
}

#[test]
fn capture_error_invalid_state_message() {
    let err = CaptureError::InvalidState {
        expected: "idle",
        actual: "running",
    };
    let msg = format!("{}", err);
    assert!(msg.contains("idle"));
    assert!(msg.contains("running"));
}

#[test]
fn capture_error_endpoint_init_failed_formats_hresult_as_hex() {
    let err = CaptureError::EndpointInitFailed { hresult: -2147024809 };
    let msg = format!("{}", err);
    assert!(msg.starts_with("endpoint initialization failed: hresult 0x"));
}

#[test]
fn engine_error_from_capture_error() {
    let err: EngineError = CaptureError::AccessDenied.into();
    assert!(matches!(err, EngineError::Capture(_)));
}

#[test]
fn engine_error_from_directory_error() {
    let err: EngineError = DirectoryError::SessionNotFound { pid: 7 }.into();
    assert!(matches!(err, EngineError::Directory(_)));
}

#[test]
fn recovery_strategy_fatal_for_no_such_process() {
    let err = CaptureError::NoSuchProcess { pid: 1 };
    assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Fatal));
}

#[test]
fn recovery_strategy_retry_for_activation_timeout() {
    let err = CaptureError::ActivationTimeout(Duration::from_secs(3));
    assert!(matches!(
        err.recovery_strategy(),
        RecoveryStrategy::Retry { .. }
    ));
}

// ─── Shutdown Signal Tests ──────────────────────────────────────────

#[test]
fn shutdown_signal_starts_unsignaled() {
    let s = ShutdownSignal::new();
    assert!(!s.is_signaled());
}

#[test]
fn shutdown_signal_wait_timeout_elapses_without_signal() {
    let s = ShutdownSignal::new();
    assert!(!s.wait_timeout(Duration::from_millis(10)));
}
