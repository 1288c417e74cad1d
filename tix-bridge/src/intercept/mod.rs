//! Process-wide interception of the reserved modifier keys.
//!
//! One low-level keyboard hook serves every session window. The hook
//! callback consults a shared [`RouteTable`] keyed by window identity:
//! if the OS foreground window is a registered session, the reserved
//! key is forwarded to that session and swallowed locally, otherwise it
//! passes through untouched.
//!
//! The hook is installed when the first route is registered and removed
//! after the last one is unregistered. Installation failure only means
//! the reserved keys keep their local meaning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::input::{KeyForwarder, ReservedKey};

pub mod mock;
#[cfg(target_os = "windows")]
pub mod windows;

pub use mock::MockHook;
#[cfg(target_os = "windows")]
pub use windows::LowLevelHook;

// ── WindowId ─────────────────────────────────────────────────────

/// Identity of a top-level window (its raw handle value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(isize);

impl WindowId {
    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> isize {
        self.0
    }
}

/// What the hook callback tells the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    /// Continue normal dispatch.
    PassThrough,
    /// Consume the event.
    Suppress,
}

// ── RouteTable ───────────────────────────────────────────────────

/// Session windows the hook may forward to.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<WindowId, KeyForwarder>,
}

pub type SharedRoutes = Arc<Mutex<RouteTable>>;

impl RouteTable {
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.routes.contains_key(&window)
    }

    /// Handle one key event seen by the hook.
    pub fn route(&self, foreground: Option<WindowId>, vk: u16, is_down: bool) -> HookDecision {
        let Some(key) = ReservedKey::from_vk(vk) else {
            return HookDecision::PassThrough;
        };
        let Some(target) = foreground.and_then(|w| self.routes.get(&w)) else {
            return HookDecision::PassThrough;
        };
        target.send_reserved(key, is_down);
        HookDecision::Suppress
    }
}

// ── HookInstaller ────────────────────────────────────────────────

/// Registers the OS hook that feeds a [`RouteTable`].
pub trait HookInstaller {
    fn install(&mut self, routes: SharedRoutes) -> Result<(), BridgeError>;

    /// Remove the hook. Must tolerate being called when not installed.
    fn uninstall(&mut self);
}

/// `None` stands for a hook switched off by configuration.
impl<H: HookInstaller> HookInstaller for Option<H> {
    fn install(&mut self, routes: SharedRoutes) -> Result<(), BridgeError> {
        match self {
            Some(hook) => hook.install(routes),
            None => Err(BridgeError::HookInstall("disabled by configuration".into())),
        }
    }

    fn uninstall(&mut self) {
        if let Some(hook) = self {
            hook.uninstall();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Uninstalled,
    Installed,
}

// ── KeyInterceptor ───────────────────────────────────────────────

/// Owner of the single process-wide hook and its routes.
pub struct KeyInterceptor<H: HookInstaller> {
    hook: H,
    routes: SharedRoutes,
    state: HookState,
}

impl<H: HookInstaller> KeyInterceptor<H> {
    pub fn new(hook: H) -> Self {
        Self {
            hook,
            routes: Arc::new(Mutex::new(RouteTable::default())),
            state: HookState::Uninstalled,
        }
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state == HookState::Installed
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    fn table(&self) -> std::sync::MutexGuard<'_, RouteTable> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn route_count(&self) -> usize {
        self.table().len()
    }

    /// Add a route for `window`, installing the hook if needed.
    /// Returns whether the hook is installed afterwards.
    pub fn register(&mut self, window: WindowId, keys: KeyForwarder) -> bool {
        self.table().routes.insert(window, keys);
        debug!(window = window.raw(), "key route registered");

        if self.state == HookState::Uninstalled {
            match self.hook.install(Arc::clone(&self.routes)) {
                Ok(()) => {
                    self.state = HookState::Installed;
                    info!("reserved-key hook installed");
                }
                Err(e) => warn!(error = %e, "reserved-key hook unavailable; keys stay local"),
            }
        }
        self.is_installed()
    }

    /// Remove the route for `window`; the hook goes with the last route.
    pub fn unregister(&mut self, window: WindowId) {
        let remaining = {
            let mut table = self.table();
            table.routes.remove(&window);
            table.len()
        };
        debug!(window = window.raw(), remaining, "key route removed");

        if remaining == 0 {
            self.uninstall();
        }
    }

    fn uninstall(&mut self) {
        if self.state == HookState::Installed {
            self.hook.uninstall();
            self.state = HookState::Uninstalled;
            info!("reserved-key hook removed");
        }
    }

    /// Route an event as the hook callback would.
    pub fn dispatch(&self, foreground: Option<WindowId>, vk: u16, is_down: bool) -> HookDecision {
        self.table().route(foreground, vk, is_down)
    }
}

impl<H: HookInstaller> Drop for KeyInterceptor<H> {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCall, BridgeConnection, MockBridge};
    use crate::config::ConnectConfig;
    use crate::input::keymap::vk;
    use crate::input::KeyFlags;

    fn forwarder() -> (Arc<MockBridge>, KeyForwarder) {
        let bridge = Arc::new(MockBridge::new());
        let conn = BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap();
        (bridge, KeyForwarder::new(Arc::new(conn)))
    }

    const SESSION: WindowId = WindowId::new(0x1001);
    const OTHER: WindowId = WindowId::new(0x2002);

    #[test]
    fn installs_once_for_many_windows() {
        let hook = MockHook::new();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (_, a) = forwarder();
        let (_, b) = forwarder();

        assert!(icpt.register(SESSION, a));
        assert!(icpt.register(OTHER, b));
        assert_eq!(hook.installs(), 1);

        icpt.unregister(SESSION);
        assert_eq!(icpt.state(), HookState::Installed);
        icpt.unregister(OTHER);
        assert_eq!(icpt.state(), HookState::Uninstalled);
        assert_eq!(hook.uninstalls(), 1);
        assert!(!hook.is_installed());
    }

    #[test]
    fn suppresses_only_for_session_foreground() {
        let hook = MockHook::new();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (bridge, keys) = forwarder();
        icpt.register(SESSION, keys);

        for key in ReservedKey::ALL {
            assert_eq!(hook.press(Some(SESSION), key.vk(), true), HookDecision::Suppress);
            assert_eq!(hook.press(Some(OTHER), key.vk(), true), HookDecision::PassThrough);
            assert_eq!(hook.press(None, key.vk(), true), HookDecision::PassThrough);
        }
        // Only the six forwarded presses reached the bridge.
        assert_eq!(bridge.inputs().len(), 6);
    }

    #[test]
    fn non_reserved_keys_pass_through() {
        let hook = MockHook::new();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (bridge, keys) = forwarder();
        icpt.register(SESSION, keys);

        assert_eq!(hook.press(Some(SESSION), 0x41, true), HookDecision::PassThrough);
        assert_eq!(hook.press(Some(SESSION), vk::CONTROL, true), HookDecision::PassThrough);
        assert!(bridge.inputs().is_empty());
    }

    #[test]
    fn forwards_sided_scancodes() {
        let hook = MockHook::new();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (bridge, keys) = forwarder();
        icpt.register(SESSION, keys);

        hook.press(Some(SESSION), vk::RMENU, true);
        hook.press(Some(SESSION), vk::RMENU, false);
        hook.press(Some(SESSION), vk::LWIN, true);
        assert_eq!(
            bridge.inputs(),
            vec![
                BridgeCall::Scancode {
                    scancode: 0x38,
                    flags: (KeyFlags::DOWN | KeyFlags::EXTENDED).bits()
                },
                BridgeCall::Scancode {
                    scancode: 0x38,
                    flags: KeyFlags::EXTENDED.bits()
                },
                BridgeCall::Scancode {
                    scancode: 0x5B,
                    flags: (KeyFlags::DOWN | KeyFlags::EXTENDED).bits()
                },
            ]
        );
    }

    #[test]
    fn install_failure_is_not_fatal() {
        let hook = MockHook::failing();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (_, keys) = forwarder();

        assert!(!icpt.register(SESSION, keys));
        assert_eq!(icpt.state(), HookState::Uninstalled);
        assert_eq!(icpt.route_count(), 1);
        // Without a hook the OS never asks.
        assert_eq!(hook.press(Some(SESSION), vk::LMENU, true), HookDecision::PassThrough);

        icpt.unregister(SESSION);
        assert_eq!(hook.uninstalls(), 0);
    }

    #[test]
    fn disabled_hook_keeps_routes() {
        let mut icpt = KeyInterceptor::new(None::<MockHook>);
        let (_, keys) = forwarder();

        assert!(!icpt.register(SESSION, keys));
        assert_eq!(icpt.route_count(), 1);
        icpt.unregister(SESSION);
        assert_eq!(icpt.route_count(), 0);
    }

    #[test]
    fn dispatch_matches_the_installed_callback() {
        let hook = MockHook::new();
        let mut icpt = KeyInterceptor::new(hook.clone());
        let (bridge, keys) = forwarder();
        icpt.register(SESSION, keys);

        assert_eq!(icpt.dispatch(Some(SESSION), vk::LCONTROL, true), HookDecision::Suppress);
        assert_eq!(icpt.dispatch(Some(OTHER), vk::LCONTROL, true), HookDecision::PassThrough);
        assert_eq!(icpt.dispatch(Some(SESSION), 0x41, true), HookDecision::PassThrough);
        assert_eq!(
            hook.press(Some(SESSION), vk::LCONTROL, false),
            icpt.dispatch(Some(SESSION), vk::LCONTROL, false)
        );
        assert_eq!(bridge.inputs().len(), 3);
    }

    #[test]
    fn drop_removes_hook() {
        let hook = MockHook::new();
        {
            let mut icpt = KeyInterceptor::new(hook.clone());
            let (_, keys) = forwarder();
            icpt.register(SESSION, keys);
            assert!(hook.is_installed());
        }
        assert!(!hook.is_installed());
    }
}
