//! Activation Protocol (C4): asynchronous, completion-callback-based
//! activation of a process-scoped loopback endpoint (§4.4).
//!
//! The platform's single-shot completion callback is modeled as a one-shot
//! channel: a shared result slot plus a Win32 event. `activate` writes
//! "awaiting" by creating the event, the completion handler writes the
//! result and signals it, and `activate` reads it back after a bounded wait.

use crate::types::{AudioFormat, InclusionMode};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use windows::core::{implement, Interface, Result as WinResult, HSTRING};
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    IActivateAudioInterfaceAsyncOperation, IActivateAudioInterfaceCompletionHandler,
    IActivateAudioInterfaceCompletionHandler_Impl, IAudioCaptureClient, IAudioClient,
    AUDCLNT_SHAREMODE_SHARED, AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM,
    AUDCLNT_STREAMFLAGS_EVENTCALLBACK, AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY, WAVEFORMATEX,
    WAVE_FORMAT_IEEE_FLOAT,
};
use windows::Win32::System::Com::StructuredStorage::PROPVARIANT;
use windows::Win32::System::Threading::{CreateEventW, SetEvent, WaitForSingleObject};
use wincap_foundation::clock::{Deadline, SharedClock};
use wincap_foundation::error::CaptureError;

const VT_BLOB: u16 = 0x0041;
const ACTIVATION_TYPE_PROCESS_LOOPBACK: i32 = 1;
/// Native `PROCESS_LOOPBACK_MODE_INCLUDE_TARGET_PROCESS_TREE`. The platform
/// offers no narrower "single process, no descendants" mode, so
/// `InclusionMode::IncludeProcessOnly` is also mapped here.
const LOOPBACK_MODE_INCLUDE_TREE: i32 = 0;
const LOOPBACK_MODE_EXCLUDE_TREE: i32 = 1;

const VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK: &str = "VAD\\Process_Loopback";

/// Raw PROPVARIANT layout for `VT_BLOB` on x64, used to hand
/// `AUDIOCLIENT_ACTIVATION_PARAMS` through `ActivateAudioInterfaceAsync`,
/// which the `windows` crate's typed `PROPVARIANT` has no constructor for.
#[repr(C)]
struct PropVariantBlob {
    vt: u16,
    reserved1: u16,
    reserved2: u16,
    reserved3: u16,
    cb_size: u32,
    _pad: u32,
    p_blob_data: *const u8,
}

/// Mirrors `AUDIOCLIENT_ACTIVATION_PARAMS` with its
/// `AUDIOCLIENT_PROCESS_LOOPBACK_PARAMS` union member flattened in place.
#[repr(C)]
struct ProcessLoopbackActivationParams {
    activation_type: i32,
    target_process_id: u32,
    process_loopback_mode: i32,
}

fn loopback_mode_for(mode: InclusionMode) -> i32 {
    match mode {
        InclusionMode::ExcludeTargetTree => LOOPBACK_MODE_EXCLUDE_TREE,
        InclusionMode::IncludeTargetTree | InclusionMode::IncludeProcessOnly => {
            LOOPBACK_MODE_INCLUDE_TREE
        }
    }
}

enum ActivationOutcome {
    Success(IAudioClient),
    Failed(windows::core::Error),
}

struct ResultSlot {
    outcome: Mutex<Option<ActivationOutcome>>,
    event: HANDLE,
}

// SAFETY: HANDLE is an opaque kernel object reference; passing it across
// threads is the documented way to signal completion.
unsafe impl Send for ResultSlot {}
unsafe impl Sync for ResultSlot {}

impl Drop for ResultSlot {
    /// Closes the event only once every reference is gone — `activate`'s own
    /// clone and the completion handler's clone, whichever outlives the
    /// other. Closing it eagerly on the waiting thread would let the OS
    /// recycle the handle value for something unrelated while a still-live
    /// `ActivateCompleted` callback (running on its own thread) calls
    /// `SetEvent` on it.
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.event);
        }
    }
}

#[implement(IActivateAudioInterfaceCompletionHandler)]
struct CompletionHandler {
    slot: Arc<ResultSlot>,
}

impl IActivateAudioInterfaceCompletionHandler_Impl for CompletionHandler_Impl {
    fn ActivateCompleted(
        &self,
        operation: Option<&IActivateAudioInterfaceAsyncOperation>,
    ) -> WinResult<()> {
        let outcome = match operation.map(read_activate_result) {
            Some(Ok(client)) => ActivationOutcome::Success(client),
            Some(Err(e)) => ActivationOutcome::Failed(e),
            None => ActivationOutcome::Failed(windows::core::Error::from_win32()),
        };
        *self.slot.outcome.lock().unwrap() = Some(outcome);
        unsafe {
            let _ = SetEvent(self.slot.event);
        }
        Ok(())
    }
}

fn read_activate_result(op: &IActivateAudioInterfaceAsyncOperation) -> WinResult<IAudioClient> {
    let mut hr = windows::core::HRESULT(0);
    let mut unknown = None;
    unsafe { op.GetActivateResult(&mut hr, &mut unknown)? };
    hr.ok()?;
    let unknown = unknown.ok_or_else(windows::core::Error::from_win32)?;
    unknown.cast()
}

/// A fully initialized endpoint, ready to be handed to the Capture Engine (C3).
pub struct ActivatedEndpoint {
    pub client: IAudioClient,
    pub capture_client: IAudioCaptureClient,
    pub event: HANDLE,
    pub format: AudioFormat,
}

// SAFETY: these are thin reference-counted COM pointers; WASAPI's capture
// client and event handle are documented as safe to use from a dedicated
// worker thread distinct from the one that activated them.
unsafe impl Send for ActivatedEndpoint {}

/// Requested buffer duration, in 100ns units (200ms, matching the
/// windows-rs loopback examples in this corpus).
const BUFFER_DURATION_100NS: i64 = 2_000_000;

pub fn activate(
    process_id: u32,
    mode: InclusionMode,
    format: AudioFormat,
    timeout: Duration,
    clock: SharedClock,
) -> Result<ActivatedEndpoint, CaptureError> {
    let event = unsafe { CreateEventW(None, true, false, None) }
        .map_err(|e| CaptureError::EndpointInitFailed { hresult: e.code().0 })?;

    let slot = Arc::new(ResultSlot {
        outcome: Mutex::new(None),
        event,
    });
    let handler: IActivateAudioInterfaceCompletionHandler = CompletionHandler {
        slot: slot.clone(),
    }
    .into();

    let params = ProcessLoopbackActivationParams {
        activation_type: ACTIVATION_TYPE_PROCESS_LOOPBACK,
        target_process_id: process_id,
        process_loopback_mode: loopback_mode_for(mode),
    };
    let prop = PropVariantBlob {
        vt: VT_BLOB,
        reserved1: 0,
        reserved2: 0,
        reserved3: 0,
        cb_size: std::mem::size_of::<ProcessLoopbackActivationParams>() as u32,
        _pad: 0,
        p_blob_data: &params as *const _ as *const u8,
    };

    let activate_result = unsafe {
        let prop_ptr = &prop as *const PropVariantBlob as *const PROPVARIANT;
        windows::Win32::Media::Audio::ActivateAudioInterfaceAsync(
            &HSTRING::from(VIRTUAL_AUDIO_DEVICE_PROCESS_LOOPBACK),
            &IAudioClient::IID,
            Some(prop_ptr),
            &handler,
        )
    };
    if let Err(e) = activate_result {
        return Err(map_activation_hresult(e));
    }

    let deadline = Deadline::after(clock, timeout);
    let wait = unsafe { WaitForSingleObject(event, deadline.remaining_millis()) };
    if wait != WAIT_OBJECT_0 || deadline.is_expired() {
        return Err(CaptureError::ActivationTimeout(timeout));
    }

    let outcome = slot
        .outcome
        .lock()
        .unwrap()
        .take()
        .ok_or(CaptureError::ActivationTimeout(timeout))?;
    let client = match outcome {
        ActivationOutcome::Success(client) => client,
        ActivationOutcome::Failed(e) => return Err(map_activation_hresult(e)),
    };

    initialize_endpoint(client, format)
}

fn map_activation_hresult(e: windows::core::Error) -> CaptureError {
    match e.code().0 as u32 {
        // E_NOTIMPL / REGDB_E_CLASSNOTREG-style failures indicate the OS
        // does not offer process-scoped loopback at all.
        0x80004001 | 0x80040154 => CaptureError::UnsupportedPlatform,
        0x80070005 => CaptureError::AccessDenied,
        _ => CaptureError::from(e),
    }
}

fn initialize_endpoint(
    client: IAudioClient,
    format: AudioFormat,
) -> Result<ActivatedEndpoint, CaptureError> {
    let wave_format = WAVEFORMATEX {
        wFormatTag: WAVE_FORMAT_IEEE_FLOAT as u16,
        nChannels: format.channels,
        nSamplesPerSec: format.sample_rate_hz,
        nAvgBytesPerSec: format.sample_rate_hz * format.channels as u32 * 4,
        nBlockAlign: format.channels * 4,
        wBitsPerSample: 32,
        cbSize: 0,
    };

    let init_flags = AUDCLNT_STREAMFLAGS_EVENTCALLBACK
        | AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM
        | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY;

    unsafe {
        client
            .Initialize(
                AUDCLNT_SHAREMODE_SHARED,
                init_flags,
                BUFFER_DURATION_100NS,
                0,
                &wave_format,
                None,
            )
            .map_err(|e| CaptureError::EndpointInitFailed { hresult: e.code().0 })?;
    }

    let capture_client: IAudioCaptureClient = unsafe { client.GetService() }
        .map_err(|e| CaptureError::EndpointInitFailed { hresult: e.code().0 })?;

    let event = unsafe { CreateEventW(None, false, false, None) }
        .map_err(|e| CaptureError::EndpointInitFailed { hresult: e.code().0 })?;
    unsafe {
        client
            .SetEventHandle(event)
            .map_err(|e| CaptureError::EndpointInitFailed { hresult: e.code().0 })?;
    }

    Ok(ActivatedEndpoint {
        client,
        capture_client,
        event,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_process_only_and_include_tree_map_to_the_same_native_mode() {
        assert_eq!(
            loopback_mode_for(InclusionMode::IncludeProcessOnly),
            loopback_mode_for(InclusionMode::IncludeTargetTree)
        );
    }

    #[test]
    fn exclude_tree_maps_to_the_distinct_native_mode() {
        assert_ne!(
            loopback_mode_for(InclusionMode::ExcludeTargetTree),
            loopback_mode_for(InclusionMode::IncludeTargetTree)
        );
    }

    #[test]
    fn process_loopback_params_layout_matches_the_flattened_union() {
        assert_eq!(
            std::mem::size_of::<ProcessLoopbackActivationParams>(),
            std::mem::size_of::<i32>() * 3
        );
    }
}
