//! Contract with the external session-bridge module.
//!
//! The bridge owns the remote-session protocol. This crate only calls
//! its C entry points (see [`native::NativeBridge`]) through the
//! [`HostBridge`] trait, and every call is funnelled through a
//! [`BridgeConnection`] so nothing reaches the bridge with a released
//! handle.

use std::ffi::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::{debug, info};

use crate::config::ConnectConfig;
use crate::error::BridgeError;
use crate::input::types::{KeyFlags, LockFlags, MouseAction};

pub mod mock;
pub mod native;

pub use mock::{BridgeCall, MockBridge};
pub use native::NativeBridge;

// ── RawHandle ────────────────────────────────────────────────────

/// Opaque, non-null handle returned by a successful `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token owned by the bridge module; this
// crate never dereferences it, it only hands it back to the bridge.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}

impl RawHandle {
    /// Wrap a pointer returned by the bridge. `None` for null.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

// ── HostBridge ───────────────────────────────────────────────────

/// The bridge module's entry points, one method per exported function.
///
/// Implementations may assume every `handle` came from their own
/// `connect` and has not been passed to `free`; [`BridgeConnection`]
/// upholds that.
pub trait HostBridge: Send + Sync {
    /// Open a session. `Ok(None)` means the bridge returned null.
    fn connect(&self, config: &ConnectConfig) -> Result<Option<RawHandle>, BridgeError>;

    /// Liveness step: `0` means disconnected.
    fn step(&self, handle: RawHandle) -> i32;

    fn send_scancode(&self, handle: RawHandle, scancode: u16, flags: KeyFlags);

    fn send_mouse(&self, handle: RawHandle, action: MouseAction, x: i32, y: i32);

    fn sync_locks(&self, handle: RawHandle, flags: LockFlags);

    /// Name of the frame segment for this session.
    fn shm_name(&self, handle: RawHandle) -> String;

    /// Name of the frame notification event for this session.
    fn event_name(&self, handle: RawHandle) -> String;

    fn free(&self, handle: RawHandle);
}

// ── BridgeConnection ─────────────────────────────────────────────

/// One live bridge session, shared by the UI context, the heartbeat
/// thread and the key interceptor.
///
/// After [`release`](Self::release) every method is a no-op and
/// [`step`](Self::step) reports `0`.
pub struct BridgeConnection {
    bridge: Arc<dyn HostBridge>,
    handle: AtomicPtr<c_void>,
    server: String,
}

impl BridgeConnection {
    /// Connect through `bridge`. A null handle is a connection error.
    pub fn open(bridge: Arc<dyn HostBridge>, config: &ConnectConfig) -> Result<Self, BridgeError> {
        info!(server = %config.server, port = config.port, "connecting");
        let handle = bridge
            .connect(config)?
            .ok_or_else(|| BridgeError::ConnectFailed {
                server: config.server.clone(),
                port: config.port,
            })?;
        info!(server = %config.server, "bridge session established");

        Ok(Self {
            bridge,
            handle: AtomicPtr::new(handle.as_ptr()),
            server: config.server.clone(),
        })
    }

    fn handle(&self) -> Option<RawHandle> {
        RawHandle::from_ptr(self.handle.load(Ordering::Acquire))
    }

    /// Server this connection was opened to.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_open(&self) -> bool {
        self.handle().is_some()
    }

    pub fn step(&self) -> i32 {
        match self.handle() {
            Some(h) => self.bridge.step(h),
            None => 0,
        }
    }

    pub fn send_scancode(&self, scancode: u16, flags: KeyFlags) {
        if let Some(h) = self.handle() {
            self.bridge.send_scancode(h, scancode, flags);
        }
    }

    pub fn send_mouse(&self, action: MouseAction, x: i32, y: i32) {
        if let Some(h) = self.handle() {
            self.bridge.send_mouse(h, action, x, y);
        }
    }

    pub fn sync_locks(&self, flags: LockFlags) {
        if let Some(h) = self.handle() {
            self.bridge.sync_locks(h, flags);
        }
    }

    /// `(segment name, event name)` for this session.
    pub fn resource_names(&self) -> Result<(String, String), BridgeError> {
        let h = self.handle().ok_or(BridgeError::Released)?;
        Ok((self.bridge.shm_name(h), self.bridge.event_name(h)))
    }

    /// Free the bridge session. Only the first call reaches the bridge.
    pub fn release(&self) {
        let raw = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
        if let Some(h) = RawHandle::from_ptr(raw) {
            debug!(server = %self.server, "releasing bridge handle");
            self.bridge.free(h);
        }
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BridgeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConnection")
            .field("server", &self.server)
            .field("open", &self.is_open())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_connect_is_connection_error() {
        let bridge = Arc::new(MockBridge::refusing());
        let err = BridgeConnection::open(bridge, &ConnectConfig::default()).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectFailed { port: 3389, .. }));
    }

    #[test]
    fn release_frees_exactly_once() {
        let bridge = Arc::new(MockBridge::new());
        let conn = BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap();
        conn.release();
        conn.release();
        drop(conn);
        assert_eq!(bridge.count(|c| matches!(c, BridgeCall::Free)), 1);
    }

    #[test]
    fn calls_after_release_never_reach_bridge() {
        let bridge = Arc::new(MockBridge::new());
        let conn = BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap();
        conn.release();

        conn.send_mouse(MouseAction::LeftDown, 1, 2);
        conn.send_scancode(0x1E, KeyFlags::DOWN);
        conn.sync_locks(LockFlags::NUM_LOCK);
        assert_eq!(conn.step(), 0);
        assert!(matches!(conn.resource_names(), Err(BridgeError::Released)));

        let calls = bridge.calls();
        assert_eq!(calls, vec![BridgeCall::Connect, BridgeCall::Free]);
    }

    #[test]
    fn resource_names_come_from_bridge() {
        let bridge = Arc::new(MockBridge::with_names("Local\\Mem_7", "Local\\Evt_7"));
        let conn = BridgeConnection::open(bridge, &ConnectConfig::default()).unwrap();
        let (shm, event) = conn.resource_names().unwrap();
        assert_eq!(shm, "Local\\Mem_7");
        assert_eq!(event, "Local\\Evt_7");
    }
}
