//! [`LocalKeyboard`] backed by the active Win32 keyboard layout.

use windows::Win32::UI::Input::KeyboardAndMouse::{GetKeyState, MAPVK_VK_TO_VSC, MapVirtualKeyW};

use super::keymap::{LocalKeyboard, vk};
use super::types::LockState;

/// The calling thread's keyboard layout and toggle state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Win32Keyboard;

fn toggled(code: u16) -> bool {
    // SAFETY: GetKeyState has no preconditions.
    unsafe { GetKeyState(i32::from(code)) & 0x0001 != 0 }
}

impl LocalKeyboard for Win32Keyboard {
    fn scancode_for(&self, code: u16) -> u16 {
        // SAFETY: MapVirtualKeyW has no preconditions.
        let scancode = unsafe { MapVirtualKeyW(u32::from(code), MAPVK_VK_TO_VSC) };
        u16::try_from(scancode).unwrap_or(0)
    }

    fn lock_state(&self) -> LockState {
        LockState {
            num_lock: toggled(vk::NUMLOCK),
            caps_lock: toggled(vk::CAPITAL),
            scroll_lock: toggled(vk::SCROLL),
        }
    }
}
