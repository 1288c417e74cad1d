//! Mock hook for unit testing.
//!
//! Stands in for the OS: while "installed" it holds the route table,
//! and [`MockHook::press`] plays the part of the hook callback.

use std::sync::{Arc, Mutex};

use super::{HookDecision, HookInstaller, SharedRoutes, WindowId};
use crate::error::BridgeError;

#[derive(Default)]
struct HookLog {
    routes: Option<SharedRoutes>,
    installs: usize,
    uninstalls: usize,
}

/// A cloneable fake hook; clones share state.
#[derive(Clone, Default)]
pub struct MockHook {
    log: Arc<Mutex<HookLog>>,
    fail: bool,
}

impl MockHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A hook whose installation always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn installs(&self) -> usize {
        self.log.lock().expect("lock poisoned").installs
    }

    pub fn uninstalls(&self) -> usize {
        self.log.lock().expect("lock poisoned").uninstalls
    }

    pub fn is_installed(&self) -> bool {
        self.log.lock().expect("lock poisoned").routes.is_some()
    }

    /// Deliver a key event as the OS would while the hook is installed.
    pub fn press(&self, foreground: Option<WindowId>, vk: u16, is_down: bool) -> HookDecision {
        let routes = self.log.lock().expect("lock poisoned").routes.clone();
        match routes {
            Some(routes) => routes
                .lock()
                .expect("lock poisoned")
                .route(foreground, vk, is_down),
            None => HookDecision::PassThrough,
        }
    }
}

impl HookInstaller for MockHook {
    fn install(&mut self, routes: SharedRoutes) -> Result<(), BridgeError> {
        if self.fail {
            return Err(BridgeError::HookInstall("mock hook refused".into()));
        }
        let mut log = self.log.lock().expect("lock poisoned");
        log.routes = Some(routes);
        log.installs += 1;
        Ok(())
    }

    fn uninstall(&mut self) {
        let mut log = self.log.lock().expect("lock poisoned");
        if log.routes.take().is_some() {
            log.uninstalls += 1;
        }
    }
}
