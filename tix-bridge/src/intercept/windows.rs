//! `WH_KEYBOARD_LL` hook backing [`KeyInterceptor`](super::KeyInterceptor).
//!
//! The callback runs on the thread that installed the hook, inside that
//! thread's message pump, so the installing thread must keep pumping
//! messages. It forwards at most one bridge call and never blocks: if
//! the route table is busy the event passes through.
//!
//! # Safety
//!
//! `unsafe` is used only for Win32 FFI calls; each block carries a
//! `// SAFETY:` note.

use std::ffi::c_void;
use std::sync::Mutex;
use std::sync::atomic::{AtomicIsize, Ordering};

use tracing::debug;
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetForegroundWindow, HC_ACTION, HHOOK, KBDLLHOOKSTRUCT, SetWindowsHookExW,
    UnhookWindowsHookEx, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

use super::{HookDecision, HookInstaller, SharedRoutes, WindowId};
use crate::error::BridgeError;

/// Routes seen by the callback while the hook is installed.
static ROUTES: Mutex<Option<SharedRoutes>> = Mutex::new(None);

/// Raw `HHOOK` value, `0` when not installed.
static HOOK: AtomicIsize = AtomicIsize::new(0);

/// The process's single low-level keyboard hook.
#[derive(Debug, Default)]
pub struct LowLevelHook;

impl LowLevelHook {
    pub fn new() -> Self {
        Self
    }
}

impl HookInstaller for LowLevelHook {
    fn install(&mut self, routes: SharedRoutes) -> Result<(), BridgeError> {
        let mut slot = ROUTES.lock().unwrap_or_else(|e| e.into_inner());
        if HOOK.load(Ordering::Acquire) != 0 {
            return Err(BridgeError::HookInstall(
                "a keyboard hook is already installed in this process".into(),
            ));
        }

        // SAFETY: the callback matches HOOKPROC; the module handle (or
        // none) identifies this executable.
        let hook = unsafe {
            let module = GetModuleHandleW(None).map(HINSTANCE::from).unwrap_or_default();
            SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), module, 0)
                .or_else(|_| SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0))
        }
        .map_err(|e| BridgeError::HookInstall(e.to_string()))?;

        *slot = Some(routes);
        HOOK.store(hook.0 as isize, Ordering::Release);
        Ok(())
    }

    fn uninstall(&mut self) {
        let raw = HOOK.swap(0, Ordering::AcqRel);
        if raw != 0 {
            // SAFETY: `raw` came from SetWindowsHookExW and is unhooked once.
            if let Err(e) = unsafe { UnhookWindowsHookEx(HHOOK(raw as *mut c_void)) } {
                debug!(error = %e, "UnhookWindowsHookEx failed");
            }
        }
        *ROUTES.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

fn decide(vk: u16, is_down: bool) -> HookDecision {
    let Ok(slot) = ROUTES.try_lock() else {
        return HookDecision::PassThrough;
    };
    let Some(routes) = slot.as_ref() else {
        return HookDecision::PassThrough;
    };
    let Ok(table) = routes.try_lock() else {
        return HookDecision::PassThrough;
    };

    // SAFETY: GetForegroundWindow has no preconditions.
    let foreground = unsafe { GetForegroundWindow() };
    let foreground = (!foreground.is_invalid()).then(|| WindowId::new(foreground.0 as isize));
    table.route(foreground, vk, is_down)
}

/// Low-level keyboard hook callback.
///
/// # Safety
///
/// Called by Windows with a `KBDLLHOOKSTRUCT` in `l_param` when
/// `n_code == HC_ACTION`.
unsafe extern "system" fn keyboard_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code == HC_ACTION as i32 {
        // SAFETY: l_param points to a KBDLLHOOKSTRUCT for HC_ACTION.
        let kbs = unsafe { &*(l_param.0 as *const KBDLLHOOKSTRUCT) };
        let is_down = match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(true),
            WM_KEYUP | WM_SYSKEYUP => Some(false),
            _ => None,
        };
        if let Some(is_down) = is_down {
            if decide(kbs.vkCode as u16, is_down) == HookDecision::Suppress {
                return LRESULT(1);
            }
        }
    }
    // SAFETY: forward to the next hook in the chain.
    unsafe { CallNextHookEx(None, n_code, w_param, l_param) }
}
