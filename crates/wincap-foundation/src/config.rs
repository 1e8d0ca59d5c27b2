//! Layered capture configuration (§10.3): `Default` → optional TOML file →
//! CLI flags, in that order of increasing precedence. Loading the file and
//! applying flags is the CLI binary's job; this crate only owns the shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frames per emitted chunk. Default matches 50ms at 48kHz.
    pub chunk_frame_count: u32,
    /// Frame Queue capacity, in chunks. Default holds ~1s of audio at the
    /// default chunk size.
    pub queue_capacity_chunks: u32,
    /// Bound on waiting for the activation completion callback (§4.4).
    pub activation_timeout_ms: u32,
    /// Bound on the worker's wait for the endpoint's "frames available"
    /// event; keeps `stop()` responsive even when the endpoint is idle.
    pub worker_event_timeout_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            chunk_frame_count: 2_400, // 50ms @ 48kHz
            queue_capacity_chunks: 20, // ~1s @ 50ms chunks
            activation_timeout_ms: 5_000,
            worker_event_timeout_ms: 50,
        }
    }
}
