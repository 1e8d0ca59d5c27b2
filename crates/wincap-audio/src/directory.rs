//! Session Directory (C5): enumerates per-process audio sessions on the
//! default render endpoint and reads/writes per-session volume and mute
//! (§4.5). Independent of C1-C4; stateless across calls.

use crate::types::{AudioSession, SessionState};
use windows::core::{Interface, PWSTR};
use windows::Win32::Foundation::CloseHandle;
use windows::Win32::Media::Audio::{
    eConsole, eRender, AudioSessionStateActive, AudioSessionStateExpired,
    AudioSessionStateInactive, IAudioSessionControl2, IAudioSessionEnumerator,
    IAudioSessionManager2, IMMDeviceEnumerator, ISimpleAudioVolume, MMDeviceEnumerator,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use wincap_foundation::error::DirectoryError;

const UNKNOWN_PROCESS_NAME: &str = "unknown";

/// `enumerate`, `set_volume`, `set_mute`, `get_volume`, `get_mute` — each
/// call opens the platform's session manager, acts, and releases it; no
/// state is cached between calls (§4.5 Concurrency).
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionDirectory;

impl SessionDirectory {
    pub fn new() -> Self {
        Self
    }

    pub fn enumerate(&self) -> Result<Vec<AudioSession>, DirectoryError> {
        let manager = session_manager()?;
        let enumerator = unsafe { manager.GetSessionEnumerator()? };
        let count = unsafe { enumerator.GetCount()? };

        let mut sessions = Vec::with_capacity(count.max(0) as usize);
        for i in 0..count {
            let control = unsafe { enumerator.GetSession(i)? };
            let control2: IAudioSessionControl2 = control.cast()?;
            sessions.push(read_session(&control2)?);
        }
        Ok(sessions)
    }

    pub fn set_volume(&self, pid: u32, volume: f32) -> Result<bool, DirectoryError> {
        match find_control(pid)? {
            Some(control) => {
                let simple: ISimpleAudioVolume = control.cast()?;
                unsafe { simple.SetMasterVolume(volume.clamp(0.0, 1.0), std::ptr::null())? };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_mute(&self, pid: u32, muted: bool) -> Result<bool, DirectoryError> {
        match find_control(pid)? {
            Some(control) => {
                let simple: ISimpleAudioVolume = control.cast()?;
                unsafe { simple.SetMute(muted, std::ptr::null())? };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_volume(&self, pid: u32) -> Result<Option<f32>, DirectoryError> {
        match find_control(pid)? {
            Some(control) => {
                let simple: ISimpleAudioVolume = control.cast()?;
                Ok(Some(unsafe { simple.GetMasterVolume()? }))
            }
            None => Ok(None),
        }
    }

    pub fn get_mute(&self, pid: u32) -> Result<Option<bool>, DirectoryError> {
        match find_control(pid)? {
            Some(control) => {
                let simple: ISimpleAudioVolume = control.cast()?;
                Ok(Some(unsafe { simple.GetMute()?.as_bool() }))
            }
            None => Ok(None),
        }
    }
}

fn session_manager() -> Result<IAudioSessionManager2, DirectoryError> {
    unsafe {
        let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
        let device = enumerator.GetDefaultAudioEndpoint(eRender, eConsole)?;
        Ok(device.Activate(CLSCTX_ALL, None)?)
    }
}

/// Finds the first session whose process id matches `pid` (§4.5 Matching
/// rule: name-based lookups resolve to this by a single enumeration at a
/// higher layer, never here).
fn find_control(pid: u32) -> Result<Option<IAudioSessionControl2>, DirectoryError> {
    let manager = session_manager()?;
    let enumerator: IAudioSessionEnumerator = unsafe { manager.GetSessionEnumerator()? };
    let count = unsafe { enumerator.GetCount()? };
    for i in 0..count {
        let control = unsafe { enumerator.GetSession(i)? };
        let control2: IAudioSessionControl2 = control.cast()?;
        if unsafe { control2.GetProcessId()? } == pid {
            return Ok(Some(control2));
        }
    }
    Ok(None)
}

fn read_session(control: &IAudioSessionControl2) -> Result<AudioSession, DirectoryError> {
    let process_id = unsafe { control.GetProcessId().unwrap_or(0) };
    let process_name = resolve_process_name(process_id);
    let display_name = unsafe { control.GetDisplayName() }
        .map(|p| {
            let s = unsafe { p.to_string() }.unwrap_or_default();
            unsafe { CoTaskMemFree(Some(p.0 as *const _)) };
            s
        })
        .unwrap_or_default();
    let state = match unsafe { control.GetState() } {
        Ok(s) if s == AudioSessionStateActive => SessionState::Active,
        Ok(s) if s == AudioSessionStateExpired => SessionState::Expired,
        Ok(s) if s == AudioSessionStateInactive => SessionState::Inactive,
        _ => SessionState::Expired,
    };
    let simple: ISimpleAudioVolume = control.cast()?;
    let volume = unsafe { simple.GetMasterVolume() }.unwrap_or(0.0);
    let muted = unsafe { simple.GetMute() }
        .map(|b| b.as_bool())
        .unwrap_or(false);

    Ok(AudioSession {
        process_id,
        process_name,
        display_name,
        state,
        volume,
        muted,
    })
}

/// Resolves a process id to its image-file name. Protected or exited
/// processes report `"unknown"` rather than failing the whole enumeration
/// (§4.5 enumerate).
fn resolve_process_name(pid: u32) -> String {
    if pid == 0 {
        return UNKNOWN_PROCESS_NAME.to_string();
    }
    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) {
            Ok(h) => h,
            Err(_) => return UNKNOWN_PROCESS_NAME.to_string(),
        };
        let mut buf = [0u16; 1024];
        let mut len = buf.len() as u32;
        let ok = QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_WIN32,
            PWSTR(buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(handle);
        if ok.is_err() {
            return UNKNOWN_PROCESS_NAME.to_string();
        }
        let full_path = String::from_utf16_lossy(&buf[..len as usize]);
        full_path
            .rsplit(['\\', '/'])
            .next()
            .map(|s| s.to_string())
            .unwrap_or(full_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_keeps_volume_within_unit_range() {
        assert_eq!((-0.3f32).clamp(0.0, 1.0), 0.0);
        assert_eq!((1.7f32).clamp(0.0, 1.0), 1.0);
        assert_eq!((0.5f32).clamp(0.0, 1.0), 0.5);
    }
}
