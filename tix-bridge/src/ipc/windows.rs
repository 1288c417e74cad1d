//! Named file mapping and named event opened by the names the bridge
//! reports.
//!
//! # Safety
//!
//! `unsafe` is used only for Win32 FFI calls; each block carries a
//! `// SAFETY:` note.

use std::ptr::NonNull;
use std::time::Duration;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, FALSE, HANDLE};
use windows::Win32::System::Memory::{
    FILE_MAP_READ, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile,
};
use windows::Win32::System::Threading::{
    EVENT_MODIFY_STATE, OpenEventW, SYNCHRONIZATION_SYNCHRONIZE, WAIT_OBJECT_0,
    WaitForSingleObject,
};
use windows::core::PCWSTR;

use super::{FrameNotifier, IpcBackend, SharedSegment};
use crate::error::BridgeError;

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

// ── MappedSegment ────────────────────────────────────────────────

/// A read-only view of a named file mapping.
pub struct MappedSegment {
    mapping: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    base: NonNull<u8>,
    len: usize,
}

impl SharedSegment for MappedSegment {
    fn base(&self) -> NonNull<u8> {
        self.base
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for MappedSegment {
    fn drop(&mut self) {
        // SAFETY: view and handle were produced together in `open_segment`
        // and are released once, here.
        unsafe {
            if let Err(e) = UnmapViewOfFile(self.view) {
                debug!(error = %e, "UnmapViewOfFile failed");
            }
            let _ = CloseHandle(self.mapping);
        }
    }
}

// ── NamedEvent ───────────────────────────────────────────────────

/// A named auto-reset event opened for waiting.
pub struct NamedEvent {
    handle: HANDLE,
}

// SAFETY: kernel event handles may be waited on from any thread.
unsafe impl Send for NamedEvent {}

impl FrameNotifier for NamedEvent {
    fn wait(&self, timeout: Duration) -> bool {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        // SAFETY: the handle is open for SYNCHRONIZE until drop.
        unsafe { WaitForSingleObject(self.handle, ms) == WAIT_OBJECT_0 }
    }
}

impl Drop for NamedEvent {
    fn drop(&mut self) {
        // SAFETY: opened in `open_notifier`, closed once.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

// ── Win32Ipc ─────────────────────────────────────────────────────

/// Opens the bridge's kernel objects in the current session namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Ipc;

impl IpcBackend for Win32Ipc {
    type Segment = MappedSegment;
    type Notifier = NamedEvent;

    fn open_segment(&self, name: &str, capacity: usize) -> Result<MappedSegment, BridgeError> {
        let seg_err = |reason: String| BridgeError::SegmentOpen {
            name: name.to_string(),
            capacity,
            reason,
        };
        let wide_name = wide(name);

        // SAFETY: `wide_name` is NUL-terminated and outlives the call.
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_READ.0, FALSE, PCWSTR(wide_name.as_ptr())) }
            .map_err(|e| seg_err(e.to_string()))?;

        // SAFETY: `mapping` is a valid file-mapping handle.
        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, capacity) };
        let Some(base) = NonNull::new(view.Value.cast::<u8>()) else {
            let reason = windows::core::Error::from_win32().to_string();
            // SAFETY: opened above, not yet owned by anything else.
            unsafe {
                let _ = CloseHandle(mapping);
            }
            return Err(seg_err(reason));
        };

        Ok(MappedSegment {
            mapping,
            view,
            base,
            len: capacity,
        })
    }

    fn open_notifier(&self, name: &str) -> Result<NamedEvent, BridgeError> {
        let wide_name = wide(name);
        // SAFETY: `wide_name` is NUL-terminated and outlives the call.
        let handle = unsafe {
            OpenEventW(
                SYNCHRONIZATION_SYNCHRONIZE | EVENT_MODIFY_STATE,
                FALSE,
                PCWSTR(wide_name.as_ptr()),
            )
        }
        .map_err(|e| BridgeError::NotificationOpen {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(NamedEvent { handle })
    }
}
