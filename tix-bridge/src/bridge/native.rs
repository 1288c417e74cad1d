//! [`HostBridge`] backed by the bridge's dynamic library.
//!
//! The library exports plain C functions prefixed `rdpb_`. Symbols are
//! resolved once at load time; the [`Library`] is kept alive alongside
//! the copied function pointers so they never dangle.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::Path;

use libloading::Library;
use tracing::info;

use super::{HostBridge, RawHandle};
use crate::config::ConnectConfig;
use crate::error::BridgeError;
use crate::input::types::{KeyFlags, LockFlags, MouseAction};

type ConnectFn = unsafe extern "C" fn(
    *const c_char,
    c_int,
    *const c_char,
    *const c_char,
    c_int,
    c_int,
    c_int,
) -> *mut c_void;
type StepFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type SendScancodeFn = unsafe extern "C" fn(*mut c_void, c_int, c_int);
type SendMouseFn = unsafe extern "C" fn(*mut c_void, c_int, c_int, c_int);
type SyncLocksFn = unsafe extern "C" fn(*mut c_void, c_int);
type NameFn = unsafe extern "C" fn(*mut c_void) -> *const c_char;
type FreeFn = unsafe extern "C" fn(*mut c_void);

/// The bridge module loaded from disk.
pub struct NativeBridge {
    connect: ConnectFn,
    step: StepFn,
    send_scancode: SendScancodeFn,
    send_mouse: SendMouseFn,
    sync_locks: SyncLocksFn,
    get_shm_name: NameFn,
    get_event_name: NameFn,
    free: FreeFn,
    /// Must outlive the function pointers above.
    _library: Library,
}

/// Resolve `name` and copy the function pointer out of the symbol.
unsafe fn resolve<T: Copy>(lib: &Library, name: &'static str) -> Result<T, BridgeError> {
    let mut bytes = name.as_bytes().to_vec();
    bytes.push(0);
    // SAFETY: the caller guarantees `T` matches the exported signature.
    unsafe {
        lib.get::<T>(&bytes)
            .map(|sym| *sym)
            .map_err(|_| BridgeError::MissingSymbol(name))
    }
}

impl NativeBridge {
    /// Load the bridge library at `path` and resolve every entry point.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        // SAFETY: loading runs the library's initialisers; the bridge is a
        // trusted component shipped with the viewer.
        let library = unsafe { Library::new(path) }.map_err(|e| BridgeError::LibraryLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        // SAFETY: the aliases above mirror the bridge header.
        let bridge = unsafe {
            Self {
                connect: resolve(&library, "rdpb_connect")?,
                step: resolve(&library, "rdpb_step")?,
                send_scancode: resolve(&library, "rdpb_send_scancode")?,
                send_mouse: resolve(&library, "rdpb_send_mouse")?,
                sync_locks: resolve(&library, "rdpb_sync_locks")?,
                get_shm_name: resolve(&library, "rdpb_get_shm_name")?,
                get_event_name: resolve(&library, "rdpb_get_event_name")?,
                free: resolve(&library, "rdpb_free")?,
                _library: library,
            }
        };

        info!("bridge library loaded from {}", path.display());
        Ok(bridge)
    }

    fn read_name(&self, f: NameFn, handle: RawHandle) -> String {
        // SAFETY: the handle is live (guaranteed by BridgeConnection) and
        // the bridge returns a NUL-terminated string owned by the session.
        unsafe {
            let raw = f(handle.as_ptr());
            if raw.is_null() {
                return String::new();
            }
            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    }
}

impl HostBridge for NativeBridge {
    fn connect(&self, config: &ConnectConfig) -> Result<Option<RawHandle>, BridgeError> {
        let server = CString::new(config.server.as_str())?;
        let username = CString::new(config.username.as_str())?;
        let password = CString::new(config.password.as_str())?;
        let to_c_int = |v: u32| {
            c_int::try_from(v).map_err(|_| BridgeError::InvalidConfig(format!("{v} is out of range")))
        };
        let width = to_c_int(config.width)?;
        let height = to_c_int(config.height)?;
        let color_depth = to_c_int(config.color_depth)?;

        // SAFETY: all strings outlive the call; the bridge copies them.
        let raw = unsafe {
            (self.connect)(
                server.as_ptr(),
                c_int::from(config.port),
                username.as_ptr(),
                password.as_ptr(),
                width,
                height,
                color_depth,
            )
        };
        Ok(RawHandle::from_ptr(raw))
    }

    fn step(&self, handle: RawHandle) -> i32 {
        // SAFETY: live handle.
        unsafe { (self.step)(handle.as_ptr()) }
    }

    fn send_scancode(&self, handle: RawHandle, scancode: u16, flags: KeyFlags) {
        // SAFETY: live handle.
        unsafe {
            (self.send_scancode)(handle.as_ptr(), c_int::from(scancode), c_int::from(flags.bits()))
        }
    }

    fn send_mouse(&self, handle: RawHandle, action: MouseAction, x: i32, y: i32) {
        // SAFETY: live handle.
        unsafe { (self.send_mouse)(handle.as_ptr(), action.wire(), x, y) }
    }

    fn sync_locks(&self, handle: RawHandle, flags: LockFlags) {
        // SAFETY: live handle.
        unsafe { (self.sync_locks)(handle.as_ptr(), c_int::from(flags.bits())) }
    }

    fn shm_name(&self, handle: RawHandle) -> String {
        self.read_name(self.get_shm_name, handle)
    }

    fn event_name(&self, handle: RawHandle) -> String {
        self.read_name(self.get_event_name, handle)
    }

    fn free(&self, handle: RawHandle) {
        // SAFETY: called at most once per handle by BridgeConnection.
        unsafe { (self.free)(handle.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_load_error() {
        let err = NativeBridge::load(Path::new("./definitely/not/here/RdpBridge.dll"))
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::LibraryLoad { .. }));
    }
}
