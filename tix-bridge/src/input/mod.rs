//! Local input → bridge wire encoding.
//!
//! [`InputTranslator`] is owned by the UI context of one session. Its
//! key half, [`KeyForwarder`], is cloneable so the key interceptor can
//! forward reserved keys into the same session from the hook callback.
//!
//! Time-dependent behaviour (release debounce, deferred lock sync, the
//! secure-attention sequence) never sleeps: the owner calls
//! [`InputTranslator::tick`] at or after [`InputTranslator::next_deadline`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::bridge::BridgeConnection;

pub mod keymap;
pub mod types;
#[cfg(target_os = "windows")]
pub mod windows;

pub use keymap::{FixedKeyboard, LocalKeyboard, ReservedKey};
pub use types::{
    KeyEvent, KeyFlags, LockFlags, LockState, MouseAction, MouseButton, WheelDirection,
};
#[cfg(target_os = "windows")]
pub use windows::Win32Keyboard;

use keymap::{is_extended_vk, is_reserved_modifier, sc, vk};

// ── TranslatorTiming ─────────────────────────────────────────────

/// Fixed delays used by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatorTiming {
    /// How long a button release is held back.
    pub release_debounce: Duration,
    /// Delay between a NumLock key event and the lock-state sync.
    pub lock_sync_delay: Duration,
    /// Gap between steps of the secure-attention sequence.
    pub attention_step: Duration,
}

impl Default for TranslatorTiming {
    fn default() -> Self {
        Self {
            release_debounce: Duration::from_millis(50),
            lock_sync_delay: Duration::from_millis(100),
            attention_step: Duration::from_millis(30),
        }
    }
}

// ── KeyForwarder ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ModifierState {
    control: AtomicBool,
    alt: AtomicBool,
}

/// Sends scancodes to one session and remembers which of control/alt
/// the remote side currently sees held.
#[derive(Debug, Clone)]
pub struct KeyForwarder {
    connection: Arc<BridgeConnection>,
    modifiers: Arc<ModifierState>,
}

impl KeyForwarder {
    pub fn new(connection: Arc<BridgeConnection>) -> Self {
        Self {
            connection,
            modifiers: Arc::new(ModifierState::default()),
        }
    }

    pub fn connection(&self) -> &Arc<BridgeConnection> {
        &self.connection
    }

    pub fn send_key(&self, scancode: u16, is_down: bool, is_extended: bool) {
        match scancode {
            sc::CONTROL => self.modifiers.control.store(is_down, Ordering::Release),
            sc::ALT => self.modifiers.alt.store(is_down, Ordering::Release),
            _ => {}
        }
        self.connection
            .send_scancode(scancode, KeyFlags::new(is_down, is_extended));
    }

    /// Forward one of the interceptor's reserved keys.
    pub fn send_reserved(&self, key: ReservedKey, is_down: bool) {
        self.send_key(key.scancode(), is_down, key.extended());
    }

    /// Control and alt both held on the remote side.
    pub fn chord_held(&self) -> bool {
        self.modifiers.control.load(Ordering::Acquire) && self.modifiers.alt.load(Ordering::Acquire)
    }
}

// ── InputTranslator ──────────────────────────────────────────────

/// A button release held back by the debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRelease {
    pub action: MouseAction,
    pub x: i32,
    pub y: i32,
    pub due: Instant,
}

#[derive(Debug, Clone, Copy)]
struct AttentionStep {
    at: Instant,
    scancode: u16,
    is_down: bool,
    extended: bool,
}

/// Translates one session's local input into bridge calls.
pub struct InputTranslator {
    keys: KeyForwarder,
    keyboard: Arc<dyn LocalKeyboard>,
    timing: TranslatorTiming,
    pending_release: Option<PendingRelease>,
    lock_sync_at: Option<Instant>,
    attention: VecDeque<AttentionStep>,
    /// The End press that started a secure-attention sequence; its
    /// release is swallowed.
    attention_key_held: bool,
    modifiers_intercepted: bool,
}

impl InputTranslator {
    pub fn new(
        connection: Arc<BridgeConnection>,
        keyboard: Arc<dyn LocalKeyboard>,
        timing: TranslatorTiming,
    ) -> Self {
        Self {
            keys: KeyForwarder::new(connection),
            keyboard,
            timing,
            pending_release: None,
            lock_sync_at: None,
            attention: VecDeque::new(),
            attention_key_held: false,
            modifiers_intercepted: false,
        }
    }

    /// The key path shared with the interceptor.
    pub fn key_forwarder(&self) -> KeyForwarder {
        self.keys.clone()
    }

    pub fn timing(&self) -> TranslatorTiming {
        self.timing
    }

    /// When set, control/alt/meta arriving through [`handle_key`](Self::handle_key)
    /// are dropped because the interceptor already forwarded them.
    pub fn set_modifiers_intercepted(&mut self, intercepted: bool) {
        self.modifiers_intercepted = intercepted;
    }

    fn connection(&self) -> &BridgeConnection {
        self.keys.connection()
    }

    // ── Pointer ──────────────────────────────────────────────────

    pub fn send_move(&self, x: i32, y: i32) {
        self.connection().send_mouse(MouseAction::Move, x, y);
    }

    /// Send a pointer action. Releases are held for the debounce
    /// window; a press flushes any held release first.
    pub fn send_button(&mut self, action: MouseAction, x: i32, y: i32, now: Instant) {
        if action.is_release() {
            // At most one pending release.
            self.flush_pending_release();
            self.pending_release = Some(PendingRelease {
                action,
                x,
                y,
                due: now + self.timing.release_debounce,
            });
            return;
        }
        if action.is_press() {
            self.flush_pending_release();
        }
        self.connection().send_mouse(action, x, y);
    }

    pub fn button_down(&mut self, button: MouseButton, x: i32, y: i32, now: Instant) {
        self.send_button(button.down(), x, y, now);
    }

    pub fn button_up(&mut self, button: MouseButton, x: i32, y: i32, now: Instant) {
        self.send_button(button.up(), x, y, now);
    }

    /// A double-click: flush, then a clean up/down pair.
    pub fn double_click(&mut self, button: MouseButton, x: i32, y: i32) {
        self.flush_pending_release();
        self.connection().send_mouse(button.up(), x, y);
        self.connection().send_mouse(button.down(), x, y);
    }

    pub fn send_wheel(&self, direction: WheelDirection, x: i32, y: i32) {
        self.connection().send_mouse(direction.action(), x, y);
    }

    pub fn pending_release(&self) -> Option<PendingRelease> {
        self.pending_release
    }

    /// Send the held release now, if any.
    pub fn flush_pending_release(&mut self) {
        if let Some(p) = self.pending_release.take() {
            self.connection().send_mouse(p.action, p.x, p.y);
        }
    }

    /// Drop the held release without sending it.
    pub fn discard_pending(&mut self) {
        self.pending_release = None;
        self.lock_sync_at = None;
        self.attention.clear();
    }

    // ── Keyboard ─────────────────────────────────────────────────

    pub fn send_key(&self, scancode: u16, is_down: bool, is_extended: bool) {
        self.keys.send_key(scancode, is_down, is_extended);
    }

    /// Scancode and extended flag for a window key event; scancode `0`
    /// means the key cannot be sent.
    pub fn map_key(&self, event: &KeyEvent) -> (u16, bool) {
        if let Some(key) = ReservedKey::from_vk(event.virtual_key) {
            return (key.scancode(), key.extended());
        }
        let extended = match event.virtual_key {
            vk::CONTROL | vk::MENU => event.extended,
            code => is_extended_vk(code),
        };
        let scancode = match self.keyboard.scancode_for(event.virtual_key) {
            0 => event.scan_code,
            mapped => mapped,
        };
        (scancode, extended)
    }

    /// Route a key event from the session window.
    pub fn handle_key(&mut self, event: &KeyEvent, now: Instant) {
        if event.repeat {
            return;
        }
        if self.modifiers_intercepted && is_reserved_modifier(event.virtual_key) {
            return;
        }

        if event.virtual_key == vk::END {
            if event.is_down && self.keys.chord_held() {
                self.attention_key_held = true;
                self.secure_attention(now);
                return;
            }
            if !event.is_down && std::mem::take(&mut self.attention_key_held) {
                return;
            }
        }

        let (scancode, extended) = self.map_key(event);
        if scancode == 0 {
            debug!(vk = event.virtual_key, "no scancode for key");
            return;
        }
        self.send_key(scancode, event.is_down, extended);

        if event.virtual_key == vk::NUMLOCK {
            self.schedule_lock_sync(now + self.timing.lock_sync_delay);
        }
    }

    pub fn sync_locks(&self, locks: LockState) {
        self.connection().sync_locks(locks.flags());
    }

    /// Push the local keyboard's lock toggles to the remote side.
    pub fn sync_local_locks(&self) {
        self.sync_locks(self.keyboard.lock_state());
    }

    pub fn focus_gained(&mut self) {
        self.lock_sync_at = None;
        self.sync_local_locks();
    }

    /// Sync lock state at `at` (the earliest request wins).
    pub fn schedule_lock_sync(&mut self, at: Instant) {
        self.lock_sync_at = Some(self.lock_sync_at.map_or(at, |cur| cur.min(at)));
    }

    /// Emulate control-alt-delete: press left control, left alt and
    /// delete, then release them in reverse, one step apart.
    pub fn secure_attention(&mut self, now: Instant) {
        debug!("secure attention sequence");
        let steps = [
            (sc::CONTROL, true, false),
            (sc::ALT, true, false),
            (sc::DELETE, true, true),
            (sc::DELETE, false, true),
            (sc::ALT, false, false),
            (sc::CONTROL, false, false),
        ];
        self.attention.clear();
        let mut at = now;
        for (scancode, is_down, extended) in steps {
            self.attention.push_back(AttentionStep {
                at,
                scancode,
                is_down,
                extended,
            });
            at += self.timing.attention_step;
        }
        self.tick(now);
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Run everything due at `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.pending_release.is_some_and(|p| p.due <= now) {
            self.flush_pending_release();
        }
        if self.lock_sync_at.is_some_and(|at| at <= now) {
            self.lock_sync_at = None;
            self.sync_local_locks();
        }
        while let Some(step) = self.attention.front().copied() {
            if step.at > now {
                break;
            }
            self.attention.pop_front();
            self.send_key(step.scancode, step.is_down, step.extended);
        }
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.pending_release.map(|p| p.due),
            self.lock_sync_at,
            self.attention.front().map(|s| s.at),
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeCall, MockBridge};
    use crate::config::ConnectConfig;

    fn translator() -> (Arc<MockBridge>, Arc<FixedKeyboard>, InputTranslator) {
        let bridge = Arc::new(MockBridge::new());
        let conn = Arc::new(BridgeConnection::open(bridge.clone(), &ConnectConfig::default()).unwrap());
        let keyboard = Arc::new(FixedKeyboard::new());
        let t = InputTranslator::new(conn, keyboard.clone(), TranslatorTiming::default());
        (bridge, keyboard, t)
    }

    fn mouse(action: MouseAction, x: i32, y: i32) -> BridgeCall {
        BridgeCall::Mouse { action, x, y }
    }

    fn key(scancode: u16, down: bool, ext: bool) -> BridgeCall {
        BridgeCall::Scancode {
            scancode,
            flags: KeyFlags::new(down, ext).bits(),
        }
    }

    fn key_event(virtual_key: u16, is_down: bool) -> KeyEvent {
        KeyEvent {
            virtual_key,
            scan_code: 0,
            extended: false,
            is_down,
            repeat: false,
        }
    }

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn release_sent_after_debounce_with_release_coords() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();

        t.button_down(MouseButton::Left, 10, 10, t0);
        let t1 = t0 + 5 * MS;
        t.button_up(MouseButton::Left, 12, 14, t1);
        assert_eq!(bridge.inputs(), vec![mouse(MouseAction::LeftDown, 10, 10)]);
        assert_eq!(t.next_deadline(), Some(t1 + 50 * MS));

        t.tick(t1 + 49 * MS);
        assert_eq!(bridge.inputs().len(), 1);

        t.tick(t1 + 50 * MS);
        t.tick(t1 + 80 * MS);
        assert_eq!(
            bridge.inputs(),
            vec![
                mouse(MouseAction::LeftDown, 10, 10),
                mouse(MouseAction::LeftUp, 12, 14),
            ]
        );
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn press_flushes_pending_release_first() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();

        t.button_down(MouseButton::Left, 1, 1, t0);
        t.button_up(MouseButton::Left, 2, 2, t0 + 10 * MS);
        t.button_down(MouseButton::Right, 3, 3, t0 + 20 * MS);
        assert_eq!(
            bridge.inputs(),
            vec![
                mouse(MouseAction::LeftDown, 1, 1),
                mouse(MouseAction::LeftUp, 2, 2),
                mouse(MouseAction::RightDown, 3, 3),
            ]
        );

        // The flushed release is not sent again when its timer would fire.
        t.tick(t0 + 100 * MS);
        assert_eq!(bridge.inputs().len(), 3);
    }

    #[test]
    fn second_release_supersedes_first() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();

        t.button_up(MouseButton::Left, 1, 1, t0);
        t.button_up(MouseButton::Middle, 2, 2, t0 + MS);
        assert_eq!(bridge.inputs(), vec![mouse(MouseAction::LeftUp, 1, 1)]);
        t.tick(t0 + 60 * MS);
        assert_eq!(
            bridge.inputs(),
            vec![
                mouse(MouseAction::LeftUp, 1, 1),
                mouse(MouseAction::MiddleUp, 2, 2),
            ]
        );
    }

    #[test]
    fn moves_and_wheel_do_not_flush() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();

        t.button_up(MouseButton::Left, 5, 5, t0);
        t.send_move(6, 6);
        t.send_wheel(WheelDirection::from_delta(-120), 6, 6);
        assert!(t.pending_release().is_some());
        assert_eq!(
            bridge.inputs(),
            vec![
                mouse(MouseAction::Move, 6, 6),
                mouse(MouseAction::WheelDown, 6, 6),
            ]
        );
    }

    #[test]
    fn double_click_flushes_then_sends_up_down() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();

        t.button_down(MouseButton::Left, 4, 4, t0);
        t.button_up(MouseButton::Left, 4, 4, t0 + MS);
        t.double_click(MouseButton::Left, 4, 4);
        assert_eq!(
            bridge.inputs(),
            vec![
                mouse(MouseAction::LeftDown, 4, 4),
                mouse(MouseAction::LeftUp, 4, 4),
                mouse(MouseAction::LeftUp, 4, 4),
                mouse(MouseAction::LeftDown, 4, 4),
            ]
        );
        assert!(t.pending_release().is_none());
    }

    #[test]
    fn discard_drops_pending_release() {
        let (bridge, _, mut t) = translator();
        let t0 = Instant::now();
        t.button_up(MouseButton::Right, 1, 1, t0);
        t.discard_pending();
        t.tick(t0 + Duration::from_secs(1));
        assert!(bridge.inputs().is_empty());
    }

    #[test]
    fn alt_sides_map_to_same_scancode() {
        let (bridge, _, mut t) = translator();
        let now = Instant::now();
        t.handle_key(&key_event(vk::RMENU, true), now);
        t.handle_key(&key_event(vk::LMENU, true), now);
        assert_eq!(bridge.inputs(), vec![key(0x38, true, true), key(0x38, true, false)]);
    }

    #[test]
    fn generic_control_uses_message_extended_bit() {
        let (_, _, t) = translator();
        let mut ev = key_event(vk::CONTROL, true);
        assert_eq!(t.map_key(&ev), (0x1D, false));
        ev.extended = true;
        assert_eq!(t.map_key(&ev), (0x1D, true));
    }

    #[test]
    fn navigation_keys_are_extended() {
        let (bridge, _, mut t) = translator();
        let now = Instant::now();
        t.handle_key(&key_event(vk::DELETE, true), now);
        t.handle_key(&key_event(vk::DELETE, false), now);
        t.handle_key(&key_event(0x41, true), now);
        assert_eq!(
            bridge.inputs(),
            vec![key(0x53, true, true), key(0x53, false, true), key(0x1E, true, false)]
        );
    }

    #[test]
    fn unmapped_key_falls_back_to_message_scancode() {
        let (bridge, _, mut t) = translator();
        let now = Instant::now();
        let mut ev = key_event(0xE2, true);
        t.handle_key(&ev, now);
        assert!(bridge.inputs().is_empty());

        ev.scan_code = 0x56;
        t.handle_key(&ev, now);
        assert_eq!(bridge.inputs(), vec![key(0x56, true, false)]);
    }

    #[test]
    fn auto_repeat_is_dropped() {
        let (bridge, _, mut t) = translator();
        let mut ev = key_event(0x41, true);
        ev.repeat = true;
        t.handle_key(&ev, Instant::now());
        assert!(bridge.inputs().is_empty());
    }

    #[test]
    fn intercepted_modifiers_skip_window_path() {
        let (bridge, _, mut t) = translator();
        let now = Instant::now();
        t.set_modifiers_intercepted(true);
        for code in [vk::CONTROL, vk::MENU, vk::LWIN, vk::RCONTROL] {
            t.handle_key(&key_event(code, true), now);
        }
        t.handle_key(&key_event(vk::SHIFT, true), now);
        assert_eq!(bridge.inputs(), vec![key(0x2A, true, false)]);
    }

    #[test]
    fn numlock_schedules_deferred_sync() {
        let (bridge, keyboard, mut t) = translator();
        let t0 = Instant::now();

        t.handle_key(&key_event(vk::NUMLOCK, true), t0);
        keyboard.set_locks(LockState {
            num_lock: true,
            caps_lock: true,
            scroll_lock: false,
        });
        t.tick(t0 + 99 * MS);
        assert_eq!(bridge.count(|c| matches!(c, BridgeCall::SyncLocks(_))), 0);

        t.tick(t0 + 100 * MS);
        assert_eq!(bridge.inputs().last(), Some(&BridgeCall::SyncLocks(2 | 4)));
    }

    #[test]
    fn focus_syncs_immediately() {
        let (bridge, keyboard, mut t) = translator();
        keyboard.set_locks(LockState {
            scroll_lock: true,
            ..LockState::default()
        });
        t.focus_gained();
        assert_eq!(bridge.inputs(), vec![BridgeCall::SyncLocks(1)]);
    }

    #[test]
    fn ctrl_alt_end_runs_attention_sequence() {
        let (bridge, _, mut t) = translator();
        let fwd = t.key_forwarder();
        let t0 = Instant::now();

        fwd.send_reserved(ReservedKey::LeftControl, true);
        fwd.send_reserved(ReservedKey::LeftAlt, true);
        bridge.clear();

        t.handle_key(&key_event(vk::END, true), t0);
        assert_eq!(bridge.inputs(), vec![key(0x1D, true, false)]);

        let step = t.timing().attention_step;
        for i in 1..=5 {
            t.tick(t0 + step * i);
        }
        assert_eq!(
            bridge.inputs(),
            vec![
                key(0x1D, true, false),
                key(0x38, true, false),
                key(0x53, true, true),
                key(0x53, false, true),
                key(0x38, false, false),
                key(0x1D, false, false),
            ]
        );

        // The End release belonging to the chord is swallowed.
        t.handle_key(&key_event(vk::END, false), t0 + step * 6);
        assert_eq!(bridge.inputs().len(), 6);
        assert!(t.next_deadline().is_none());
    }

    #[test]
    fn end_without_chord_is_plain_key() {
        let (bridge, _, mut t) = translator();
        let now = Instant::now();
        t.handle_key(&key_event(vk::END, true), now);
        t.handle_key(&key_event(vk::END, false), now);
        assert_eq!(bridge.inputs(), vec![key(0x4F, true, true), key(0x4F, false, true)]);
    }
}
