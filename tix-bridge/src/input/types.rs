//! Wire-level input types shared by the translator, the interceptor
//! and the bridge contract.

use bitflags::bitflags;

// ── MouseAction ──────────────────────────────────────────────────

/// Pointer action codes understood by the bridge's `send_mouse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MouseAction {
    Move = 0,
    LeftDown = 1,
    LeftUp = 2,
    RightDown = 3,
    RightUp = 4,
    WheelUp = 5,
    WheelDown = 6,
    MiddleDown = 7,
    MiddleUp = 8,
}

impl MouseAction {
    /// The integer passed across the bridge ABI.
    pub const fn wire(self) -> i32 {
        self as i32
    }

    /// `true` for the three button-press codes.
    pub const fn is_press(self) -> bool {
        matches!(self, Self::LeftDown | Self::RightDown | Self::MiddleDown)
    }

    /// `true` for the three button-release codes.
    pub const fn is_release(self) -> bool {
        matches!(self, Self::LeftUp | Self::RightUp | Self::MiddleUp)
    }
}

// ── MouseButton ──────────────────────────────────────────────────

/// Buttons the bridge can press and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub const fn down(self) -> MouseAction {
        match self {
            Self::Left => MouseAction::LeftDown,
            Self::Right => MouseAction::RightDown,
            Self::Middle => MouseAction::MiddleDown,
        }
    }

    pub const fn up(self) -> MouseAction {
        match self {
            Self::Left => MouseAction::LeftUp,
            Self::Right => MouseAction::RightUp,
            Self::Middle => MouseAction::MiddleUp,
        }
    }
}

// ── WheelDirection ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WheelDirection {
    Up,
    Down,
}

impl WheelDirection {
    /// Positive deltas scroll away from the user.
    pub fn from_delta(delta: i32) -> Self {
        if delta > 0 { Self::Up } else { Self::Down }
    }

    pub const fn action(self) -> MouseAction {
        match self {
            Self::Up => MouseAction::WheelUp,
            Self::Down => MouseAction::WheelDown,
        }
    }
}

// ── Flag bytes ───────────────────────────────────────────────────

bitflags! {
    /// Flags byte for `send_scancode`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyFlags: u8 {
        const DOWN = 0b01;
        const EXTENDED = 0b10;
    }
}

impl KeyFlags {
    pub fn new(is_down: bool, is_extended: bool) -> Self {
        let mut flags = KeyFlags::empty();
        flags.set(KeyFlags::DOWN, is_down);
        flags.set(KeyFlags::EXTENDED, is_extended);
        flags
    }
}

bitflags! {
    /// Flags byte for `sync_locks`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LockFlags: u8 {
        const SCROLL_LOCK = 0b001;
        const NUM_LOCK = 0b010;
        const CAPS_LOCK = 0b100;
    }
}

// ── LockState ────────────────────────────────────────────────────

/// Local toggle state of the three lock keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockState {
    pub num_lock: bool,
    pub caps_lock: bool,
    pub scroll_lock: bool,
}

impl LockState {
    pub fn flags(self) -> LockFlags {
        let mut flags = LockFlags::empty();
        flags.set(LockFlags::SCROLL_LOCK, self.scroll_lock);
        flags.set(LockFlags::NUM_LOCK, self.num_lock);
        flags.set(LockFlags::CAPS_LOCK, self.caps_lock);
        flags
    }
}

// ── KeyEvent ─────────────────────────────────────────────────────

/// A local key event as reported by the window's message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Platform virtual-key code.
    pub virtual_key: u16,
    /// Hardware scan code from the message, used when the platform
    /// mapping yields nothing.
    pub scan_code: u16,
    /// Extended-key bit from the message.
    pub extended: bool,
    pub is_down: bool,
    /// Auto-repeat of a held key.
    pub repeat: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_action_wire_values_are_fixed() {
        let all = [
            (MouseAction::Move, 0),
            (MouseAction::LeftDown, 1),
            (MouseAction::LeftUp, 2),
            (MouseAction::RightDown, 3),
            (MouseAction::RightUp, 4),
            (MouseAction::WheelUp, 5),
            (MouseAction::WheelDown, 6),
            (MouseAction::MiddleDown, 7),
            (MouseAction::MiddleUp, 8),
        ];
        for (action, wire) in all {
            assert_eq!(action.wire(), wire, "{action:?}");
        }
    }

    #[test]
    fn key_flags_encode_down_and_extended() {
        assert_eq!(KeyFlags::new(false, false).bits(), 0);
        assert_eq!(KeyFlags::new(true, false).bits(), 1);
        assert_eq!(KeyFlags::new(false, true).bits(), 2);
        assert_eq!(KeyFlags::new(true, true).bits(), 3);
    }

    #[test]
    fn lock_flags_or_together() {
        let state = LockState {
            num_lock: true,
            caps_lock: true,
            scroll_lock: false,
        };
        assert_eq!(state.flags().bits(), 2 | 4);
        assert_eq!(LockState::default().flags().bits(), 0);
        let all = LockState {
            num_lock: true,
            caps_lock: true,
            scroll_lock: true,
        };
        assert_eq!(all.flags().bits(), 7);
    }

    #[test]
    fn wheel_direction_follows_delta_sign() {
        assert_eq!(WheelDirection::from_delta(120).action(), MouseAction::WheelUp);
        assert_eq!(WheelDirection::from_delta(-120).action(), MouseAction::WheelDown);
    }

    #[test]
    fn buttons_map_to_press_and_release() {
        assert!(MouseButton::Middle.down().is_press());
        assert!(MouseButton::Right.up().is_release());
        assert!(!MouseAction::Move.is_press());
        assert!(!MouseAction::WheelUp.is_release());
    }
}
