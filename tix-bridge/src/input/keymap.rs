//! Virtual-key classification and scancode lookup.
//!
//! Virtual-key codes are the Windows `VK_*` values; scancodes are PC/AT
//! set 1, which is what the bridge's `send_scancode` expects.

use std::sync::Mutex;

use super::types::LockState;

/// Virtual-key codes this crate refers to by name.
pub mod vk {
    pub const BACK: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const RETURN: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const MENU: u16 = 0x12;
    pub const CAPITAL: u16 = 0x14;
    pub const ESCAPE: u16 = 0x1B;
    pub const SPACE: u16 = 0x20;
    pub const PRIOR: u16 = 0x21;
    pub const NEXT: u16 = 0x22;
    pub const END: u16 = 0x23;
    pub const HOME: u16 = 0x24;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const INSERT: u16 = 0x2D;
    pub const DELETE: u16 = 0x2E;
    pub const LWIN: u16 = 0x5B;
    pub const RWIN: u16 = 0x5C;
    pub const NUMLOCK: u16 = 0x90;
    pub const SCROLL: u16 = 0x91;
    pub const LSHIFT: u16 = 0xA0;
    pub const RSHIFT: u16 = 0xA1;
    pub const LCONTROL: u16 = 0xA2;
    pub const RCONTROL: u16 = 0xA3;
    pub const LMENU: u16 = 0xA4;
    pub const RMENU: u16 = 0xA5;
}

/// Scancodes used by the secure-attention sequence.
pub mod sc {
    pub const CONTROL: u16 = 0x1D;
    pub const ALT: u16 = 0x38;
    pub const DELETE: u16 = 0x53;
}

// ── Extended classification ──────────────────────────────────────

/// `true` for keys that carry the extended flag on the wire: the
/// navigation cluster, the right-hand control/alt keys and both meta keys.
const EXTENDED_VK: [bool; 256] = {
    let mut t = [false; 256];
    t[vk::PRIOR as usize] = true;
    t[vk::NEXT as usize] = true;
    t[vk::END as usize] = true;
    t[vk::HOME as usize] = true;
    t[vk::LEFT as usize] = true;
    t[vk::UP as usize] = true;
    t[vk::RIGHT as usize] = true;
    t[vk::DOWN as usize] = true;
    t[vk::INSERT as usize] = true;
    t[vk::DELETE as usize] = true;
    t[vk::RCONTROL as usize] = true;
    t[vk::RMENU as usize] = true;
    t[vk::LWIN as usize] = true;
    t[vk::RWIN as usize] = true;
    t
};

/// Whether `vk` is always sent with the extended flag.
pub fn is_extended_vk(vk: u16) -> bool {
    EXTENDED_VK.get(vk as usize).copied().unwrap_or(false)
}

/// Control, alt and meta in any of their generic or sided forms.
pub fn is_reserved_modifier(code: u16) -> bool {
    matches!(code, vk::CONTROL | vk::MENU) || ReservedKey::from_vk(code).is_some()
}

// ── ReservedKey ──────────────────────────────────────────────────

/// The six keys claimed by the process-wide interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedKey {
    LeftControl,
    RightControl,
    LeftAlt,
    RightAlt,
    LeftMeta,
    RightMeta,
}

impl ReservedKey {
    pub const ALL: [ReservedKey; 6] = [
        Self::LeftControl,
        Self::RightControl,
        Self::LeftAlt,
        Self::RightAlt,
        Self::LeftMeta,
        Self::RightMeta,
    ];

    pub const fn from_vk(code: u16) -> Option<Self> {
        match code {
            vk::LCONTROL => Some(Self::LeftControl),
            vk::RCONTROL => Some(Self::RightControl),
            vk::LMENU => Some(Self::LeftAlt),
            vk::RMENU => Some(Self::RightAlt),
            vk::LWIN => Some(Self::LeftMeta),
            vk::RWIN => Some(Self::RightMeta),
            _ => None,
        }
    }

    pub const fn vk(self) -> u16 {
        match self {
            Self::LeftControl => vk::LCONTROL,
            Self::RightControl => vk::RCONTROL,
            Self::LeftAlt => vk::LMENU,
            Self::RightAlt => vk::RMENU,
            Self::LeftMeta => vk::LWIN,
            Self::RightMeta => vk::RWIN,
        }
    }

    pub const fn scancode(self) -> u16 {
        match self {
            Self::LeftControl | Self::RightControl => sc::CONTROL,
            Self::LeftAlt | Self::RightAlt => sc::ALT,
            Self::LeftMeta => 0x5B,
            Self::RightMeta => 0x5C,
        }
    }

    pub const fn extended(self) -> bool {
        !matches!(self, Self::LeftControl | Self::LeftAlt)
    }
}

// ── LocalKeyboard ────────────────────────────────────────────────

/// Queries against the local keyboard: layout mapping and lock toggles.
pub trait LocalKeyboard: Send + Sync {
    /// Set-1 scancode for `vk`, or `0` if the layout has none.
    fn scancode_for(&self, vk: u16) -> u16;

    /// Current toggle state of num/caps/scroll lock.
    fn lock_state(&self) -> LockState;
}

/// US layout, set 1. Zero where the key has no scancode.
const US_SET1: [u16; 256] = {
    let mut t = [0u16; 256];
    t[vk::BACK as usize] = 0x0E;
    t[vk::TAB as usize] = 0x0F;
    t[vk::RETURN as usize] = 0x1C;
    t[vk::SHIFT as usize] = 0x2A;
    t[vk::CONTROL as usize] = 0x1D;
    t[vk::MENU as usize] = 0x38;
    t[vk::CAPITAL as usize] = 0x3A;
    t[vk::ESCAPE as usize] = 0x01;
    t[vk::SPACE as usize] = 0x39;
    t[vk::PRIOR as usize] = 0x49;
    t[vk::NEXT as usize] = 0x51;
    t[vk::END as usize] = 0x4F;
    t[vk::HOME as usize] = 0x47;
    t[vk::LEFT as usize] = 0x4B;
    t[vk::UP as usize] = 0x48;
    t[vk::RIGHT as usize] = 0x4D;
    t[vk::DOWN as usize] = 0x50;
    t[vk::INSERT as usize] = 0x52;
    t[vk::DELETE as usize] = 0x53;
    t[vk::NUMLOCK as usize] = 0x45;
    t[vk::SCROLL as usize] = 0x46;
    t[vk::LSHIFT as usize] = 0x2A;
    t[vk::RSHIFT as usize] = 0x36;

    // ── Digits (VK_0=0x30 … VK_9=0x39) ───────────────────────────
    t[0x30] = 0x0B;
    let mut d = 1;
    while d <= 9 {
        t[0x30 + d] = 0x01 + d as u16;
        d += 1;
    }

    // ── Letters (VK_A=0x41 … VK_Z=0x5A) ──────────────────────────
    let letters: [u16; 26] = [
        0x1E, 0x30, 0x2E, 0x20, 0x12, 0x21, 0x22, 0x23, 0x17, 0x24, 0x25, 0x26, 0x32, 0x31,
        0x18, 0x19, 0x10, 0x13, 0x1F, 0x14, 0x16, 0x2F, 0x11, 0x2D, 0x15, 0x2C,
    ];
    let mut i = 0;
    while i < 26 {
        t[0x41 + i] = letters[i];
        i += 1;
    }

    // ── Function keys (VK_F1=0x70 … VK_F12=0x7B) ─────────────────
    let fkeys: [u16; 12] = [
        0x3B, 0x3C, 0x3D, 0x3E, 0x3F, 0x40, 0x41, 0x42, 0x43, 0x44, 0x57, 0x58,
    ];
    let mut f = 0;
    while f < 12 {
        t[0x70 + f] = fkeys[f];
        f += 1;
    }
    t
};

/// A keyboard with the US layout and lock state set by the caller.
#[derive(Debug, Default)]
pub struct FixedKeyboard {
    locks: Mutex<LockState>,
}

impl FixedKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locks(locks: LockState) -> Self {
        Self {
            locks: Mutex::new(locks),
        }
    }

    pub fn set_locks(&self, locks: LockState) {
        *self.locks.lock().unwrap_or_else(|e| e.into_inner()) = locks;
    }
}

impl LocalKeyboard for FixedKeyboard {
    fn scancode_for(&self, vk: u16) -> u16 {
        US_SET1.get(vk as usize).copied().unwrap_or(0)
    }

    fn lock_state(&self) -> LockState {
        *self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_cluster_is_extended() {
        for code in [
            vk::UP,
            vk::DOWN,
            vk::LEFT,
            vk::RIGHT,
            vk::INSERT,
            vk::DELETE,
            vk::HOME,
            vk::END,
            vk::PRIOR,
            vk::NEXT,
        ] {
            assert!(is_extended_vk(code), "vk {code:#04x}");
        }
        assert!(!is_extended_vk(0x41));
        assert!(!is_extended_vk(vk::LCONTROL));
        assert!(!is_extended_vk(0x1234));
    }

    #[test]
    fn reserved_keys_have_fixed_scancodes() {
        let expected = [
            (ReservedKey::LeftControl, 0x1D, false),
            (ReservedKey::RightControl, 0x1D, true),
            (ReservedKey::LeftAlt, 0x38, false),
            (ReservedKey::RightAlt, 0x38, true),
            (ReservedKey::LeftMeta, 0x5B, true),
            (ReservedKey::RightMeta, 0x5C, true),
        ];
        for (key, scancode, extended) in expected {
            assert_eq!(key.scancode(), scancode, "{key:?}");
            assert_eq!(key.extended(), extended, "{key:?}");
            assert_eq!(ReservedKey::from_vk(key.vk()), Some(key));
        }
    }

    #[test]
    fn sided_extension_agrees_with_table() {
        for key in ReservedKey::ALL {
            assert_eq!(key.extended(), is_extended_vk(key.vk()), "{key:?}");
        }
    }

    #[test]
    fn generic_modifiers_are_reserved_but_shift_is_not() {
        assert!(is_reserved_modifier(vk::CONTROL));
        assert!(is_reserved_modifier(vk::MENU));
        assert!(is_reserved_modifier(vk::RWIN));
        assert!(!is_reserved_modifier(vk::SHIFT));
        assert!(!is_reserved_modifier(0x41));
    }

    #[test]
    fn us_layout_lookup() {
        let kb = FixedKeyboard::new();
        assert_eq!(kb.scancode_for(0x41), 0x1E); // A
        assert_eq!(kb.scancode_for(0x5A), 0x2C); // Z
        assert_eq!(kb.scancode_for(0x31), 0x02); // 1
        assert_eq!(kb.scancode_for(0x30), 0x0B); // 0
        assert_eq!(kb.scancode_for(0x7B), 0x58); // F12
        assert_eq!(kb.scancode_for(vk::END), 0x4F);
        assert_eq!(kb.scancode_for(0xFF), 0);
    }

    #[test]
    fn fixed_locks_can_change() {
        let kb = FixedKeyboard::new();
        assert_eq!(kb.lock_state(), LockState::default());
        let on = LockState {
            num_lock: true,
            ..LockState::default()
        };
        kb.set_locks(on);
        assert_eq!(kb.lock_state(), on);
    }
}
