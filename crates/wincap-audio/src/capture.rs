//! Capture Engine (C3): owns the CaptureSession lifecycle, the capture
//! worker thread, and the event-driven pull loop (§4.3).

use crate::activation::{self, ActivatedEndpoint};
use crate::assembler::ChunkAssembler;
use crate::queue::{self, FrameQueueConsumer, FrameQueueProducer};
use crate::types::{is_legal_capture_transition, AudioFormat, CaptureState, Chunk, InclusionMode};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use windows::core::HSTRING;
use windows::Win32::Foundation::{CloseHandle, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY;
use windows::Win32::System::Threading::{
    AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW, WaitForSingleObject,
};
use wincap_foundation::clock::{real_clock, Deadline, SharedClock};
use wincap_foundation::config::CaptureConfig;
use wincap_foundation::error::{CaptureError, RecoveryStrategy};
use wincap_foundation::shutdown::ShutdownSignal;
use wincap_foundation::state::StateMachine;
use wincap_telemetry::{CaptureMetrics, MetricsSnapshot};

const PRO_AUDIO_TASK_NAME: &str = "Pro Audio";

/// The `start`/`stop`/`pop_batch` object described in §6.
pub struct CaptureEngine {
    config: CaptureConfig,
    state: StateMachine<CaptureState>,
    metrics: CaptureMetrics,
    consumer: Mutex<Option<FrameQueueConsumer>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: ShutdownSignal,
    format: Mutex<Option<AudioFormat>>,
    clock: SharedClock,
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig) -> Self {
        Self::new_with_clock(config, real_clock())
    }

    /// Same as [`Self::new`], but with the activation-timeout and
    /// worker-wait-timeout logic driven by a caller-supplied [`Clock`](wincap_foundation::clock::Clock)
    /// (a [`TestClock`](wincap_foundation::clock::TestClock) in tests) instead
    /// of real elapsed time.
    pub fn new_with_clock(config: CaptureConfig, clock: SharedClock) -> Self {
        Self {
            config,
            state: StateMachine::new(CaptureState::Idle, is_legal_capture_transition),
            metrics: CaptureMetrics::new(),
            consumer: Mutex::new(None),
            worker: Mutex::new(None),
            shutdown: ShutdownSignal::new(),
            format: Mutex::new(None),
            clock,
        }
    }

    /// Activates a process-scoped loopback endpoint and spawns the capture
    /// worker. Only legal from `idle` (§4.3).
    pub fn start(&self, process_id: u32, mode: InclusionMode) -> Result<(), CaptureError> {
        if self.state.current() != CaptureState::Idle {
            return Err(CaptureError::InvalidState {
                expected: "idle",
                actual: "not idle",
            });
        }
        self.state
            .transition(CaptureState::Activating)
            .map_err(|_| CaptureError::InvalidState {
                expected: "idle",
                actual: "not idle",
            })?;

        // Native format is negotiated as 48kHz stereo float32, the standard
        // loopback format this virtual device accepts directly (§4.4).
        let negotiated = AudioFormat {
            sample_rate_hz: 48_000,
            channels: 2,
        };

        let endpoint = match activation::activate(
            process_id,
            mode,
            negotiated,
            Duration::from_millis(self.config.activation_timeout_ms as u64),
            self.clock.clone(),
        ) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.metrics.record_error(error_kind(&e));
                let _ = self.state.transition(CaptureState::Failed);
                let _ = self.state.transition(CaptureState::Idle);
                return Err(e);
            }
        };

        self.shutdown.reset();
        let (producer, consumer) = queue::channel(
            self.config.queue_capacity_chunks as usize,
            self.metrics.clone(),
        );
        *self.consumer.lock() = Some(consumer);
        *self.format.lock() = Some(endpoint.format);

        self.state
            .transition(CaptureState::Running)
            .map_err(|_| CaptureError::InvalidState {
                expected: "activating",
                actual: "not activating",
            })?;

        let chunk_frames = self.config.chunk_frame_count;
        let event_timeout = Duration::from_millis(self.config.worker_event_timeout_ms as u64);
        let shutdown = self.shutdown.clone();
        let metrics = self.metrics.clone();
        let state = self.state.clone();
        let worker_state = state.clone();
        let clock = self.clock.clone();

        let handle = thread::Builder::new()
            .name("wincap-capture-worker".into())
            .spawn(move || {
                run_worker(
                    endpoint,
                    producer,
                    chunk_frames,
                    event_timeout,
                    shutdown,
                    metrics,
                    clock,
                    worker_state,
                );
                // If `run_worker` already transitioned to `Failed`, this
                // `Stopping` attempt is illegal and rejected (state stays
                // `Failed`, unchanged); the following `Idle` transition is
                // legal from either `Stopping` or `Failed` (§4.3), so this
                // always lands idle regardless of which path the worker took.
                let _ = state.transition(CaptureState::Stopping);
                let _ = state.transition(CaptureState::Idle);
            })
            .map_err(|e| CaptureError::CaptureFatal(format!("spawn worker: {e}")))?;
        *self.worker.lock() = Some(handle);

        Ok(())
    }

    /// Idempotent. Joins the worker thread before returning. Any chunks the
    /// worker queued — including the final chunk flushed on teardown — stay
    /// in the queue for the caller to retrieve with a subsequent
    /// [`Self::pop_batch`]; `start` replaces the queue wholesale on the next
    /// session, so nothing leaks by leaving it populated here.
    pub fn stop(&self) {
        if self.state.current() == CaptureState::Idle {
            return;
        }
        self.shutdown.signal();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        // The worker's own state transition may already have landed idle;
        // this is a no-op in that case since `transition` only errors, never
        // panics, on an illegal edge.
        let _ = self.state.transition(CaptureState::Stopping);
        let _ = self.state.transition(CaptureState::Idle);
        self.metrics.clear_error();
    }

    pub fn pop_batch(&self, max_chunks: u32, timeout: Duration) -> Vec<Chunk> {
        match self.consumer.lock().as_mut() {
            Some(consumer) => consumer.pop_batch(max_chunks, timeout),
            None => Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.current() == CaptureState::Running
    }

    /// Valid only while running.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format.lock().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

fn error_kind(e: &CaptureError) -> &'static str {
    match e {
        CaptureError::UnsupportedPlatform => "unsupported_platform",
        CaptureError::NoSuchProcess { .. } => "no_such_process",
        CaptureError::AccessDenied => "access_denied",
        CaptureError::ActivationTimeout(_) => "activation_timeout",
        CaptureError::EndpointInitFailed { .. } => "endpoint_init_failed",
        CaptureError::InvalidState { .. } => "invalid_state",
        CaptureError::CaptureFatal(_) => "capture_fatal",
        CaptureError::Platform(_) => "platform_error",
    }
}

fn run_worker(
    endpoint: ActivatedEndpoint,
    mut producer: FrameQueueProducer,
    chunk_frames: u32,
    event_timeout: Duration,
    shutdown: ShutdownSignal,
    metrics: CaptureMetrics,
    clock: SharedClock,
    state: StateMachine<CaptureState>,
) {
    let mut thread_task_index: u32 = 0;
    let av_handle = unsafe {
        AvSetMmThreadCharacteristicsW(&HSTRING::from(PRO_AUDIO_TASK_NAME), &mut thread_task_index)
            .ok()
    };

    if let Err(e) = unsafe { endpoint.client.Start() } {
        metrics.record_error(format!("platform_error: {e}"));
        unsafe {
            let _ = CloseHandle(endpoint.event);
        }
        return;
    }

    let mut assembler = ChunkAssembler::new(endpoint.format, chunk_frames);
    let mut emit = |chunk: Chunk| {
        producer.try_push(chunk);
    };

    let mut fatal = false;
    while !shutdown.is_signaled() && !fatal {
        let deadline = Deadline::after(clock.clone(), event_timeout);
        let wait = unsafe { WaitForSingleObject(endpoint.event, deadline.remaining_millis()) };
        if wait != WAIT_OBJECT_0 {
            continue;
        }

        loop {
            let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
            let mut frames_available: u32 = 0;
            let mut flags: u32 = 0;
            let mut device_position: u64 = 0;

            let got = unsafe {
                endpoint.capture_client.GetBuffer(
                    &mut buffer_ptr,
                    &mut frames_available,
                    &mut flags,
                    None,
                    Some(&mut device_position),
                )
            };
            match got {
                Ok(()) if frames_available == 0 => break,
                Ok(()) => {}
                Err(e) => {
                    let err = CaptureError::from(e);
                    metrics.record_error(error_kind(&err));
                    if matches!(err.recovery_strategy(), RecoveryStrategy::Fatal) {
                        let _ = state.transition(CaptureState::Failed);
                        fatal = true;
                    }
                    break;
                }
            }

            if flags & AUDCLNT_BUFFERFLAGS_DATA_DISCONTINUITY.0 as u32 != 0 {
                assembler.mark_gap(frames_available, device_position, &mut emit);
            }

            let sample_count = endpoint.format.frame_size_samples(frames_available);
            let samples =
                unsafe { std::slice::from_raw_parts(buffer_ptr as *const f32, sample_count) };
            assembler.feed(samples, device_position, &mut emit);

            unsafe {
                let _ = endpoint.capture_client.ReleaseBuffer(frames_available);
            }
        }
    }

    assembler.flush(0, &mut emit);
    let _ = unsafe { endpoint.client.Stop() };
    unsafe {
        let _ = CloseHandle(endpoint.event);
        if let Ok(handle) = av_handle {
            let _ = AvRevertMmThreadCharacteristics(handle);
        }
    }
}
