use std::time::Duration;
use thiserror::Error;

/// Errors raised by the Capture Engine (C3) and the Activation Protocol (C4).
///
/// `QueueOverflow` is deliberately absent here: queue overflow is advisory-only
/// and is observed exclusively through `metrics()`, never returned from a call.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("process-scoped loopback activation is not offered by the running OS")]
    UnsupportedPlatform,

    #[error("target process {pid} does not exist or has no audio session")]
    NoSuchProcess { pid: u32 },

    #[error("access denied for the requested inclusion mode")]
    AccessDenied,

    #[error("activation did not complete within {0:?}")]
    ActivationTimeout(Duration),

    #[error("endpoint initialization failed: hresult 0x{hresult:08X}")]
    EndpointInitFailed { hresult: i32 },

    #[error("invalid state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unrecoverable capture failure: {0}")]
    CaptureFatal(String),

    #[error("platform call failed: {0}")]
    Platform(#[from] windows::core::Error),
}

/// Errors raised by the Session Directory (C5).
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("session enumeration failed: {0}")]
    EnumerationFailed(#[from] windows::core::Error),

    #[error("no session found for process {pid}")]
    SessionNotFound { pid: u32 },
}

/// Top-level error composing every subsystem, used at the CLI boundary.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Suggested recovery action for a `CaptureError`. The Capture Engine itself only
/// acts on this for transient pull errors (§4.3); everything else is advisory for
/// the embedding application.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Fatal,
    Ignore,
}

impl CaptureError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CaptureError::ActivationTimeout(_) => RecoveryStrategy::Retry {
                max_attempts: 1,
                delay: Duration::from_millis(500),
            },
            CaptureError::NoSuchProcess { .. }
            | CaptureError::AccessDenied
            | CaptureError::UnsupportedPlatform
            | CaptureError::CaptureFatal(_) => RecoveryStrategy::Fatal,
            CaptureError::EndpointInitFailed { .. } | CaptureError::Platform(_) => {
                RecoveryStrategy::Fatal
            }
            CaptureError::InvalidState { .. } => RecoveryStrategy::Ignore,
        }
    }
}
