//! Window input → session input translator.
//!
//! Routes [`WindowEvent`]s from the Win32 message loop into the
//! session's [`InputTranslator`], scaling pointer positions from the
//! window's client area to the remote desktop.

use std::time::Instant;

use tix_bridge::InputTranslator;
use tix_bridge::input::WheelDirection;

use crate::config::InputConfig;
use crate::window::WindowEvent;

/// Client-area and remote-desktop sizes used for pointer scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub window: (u32, u32),
    pub remote: (u32, u32),
}

impl Viewport {
    pub fn new(window: (u32, u32), remote: (u32, u32)) -> Self {
        Self { window, remote }
    }

    /// Map a client position onto the remote desktop, clamped to its bounds.
    pub fn to_remote(&self, x: i32, y: i32) -> (i32, i32) {
        (
            scale(x, self.window.0, self.remote.0),
            scale(y, self.window.1, self.remote.1),
        )
    }
}

fn scale(v: i32, from: u32, to: u32) -> i32 {
    if from == 0 || to == 0 {
        return v.max(0);
    }
    let scaled = if from == to {
        i64::from(v)
    } else {
        i64::from(v) * i64::from(to) / i64::from(from)
    };
    scaled.clamp(0, i64::from(to) - 1) as i32
}

/// Forward one window event. Lifecycle events (close, resize,
/// visibility) are the caller's business and ignored here.
pub fn route_event(
    event: &WindowEvent,
    input: &mut InputTranslator,
    options: &InputConfig,
    viewport: &Viewport,
    now: Instant,
) {
    match *event {
        WindowEvent::MouseMove(x, y) if options.capture_mouse => {
            let (x, y) = viewport.to_remote(x, y);
            input.send_move(x, y);
        }
        WindowEvent::MouseButton {
            button,
            pressed,
            x,
            y,
        } if options.capture_mouse => {
            let (x, y) = viewport.to_remote(x, y);
            if pressed {
                input.button_down(button, x, y, now);
            } else {
                input.button_up(button, x, y, now);
            }
        }
        WindowEvent::DoubleClick { button, x, y } if options.capture_mouse => {
            let (x, y) = viewport.to_remote(x, y);
            input.double_click(button, x, y);
        }
        WindowEvent::MouseWheel { delta, x, y } if options.capture_mouse => {
            if delta == 0 {
                return;
            }
            let (x, y) = viewport.to_remote(x, y);
            input.send_wheel(WheelDirection::from_delta(i32::from(delta)), x, y);
        }
        WindowEvent::Key(key) if options.capture_keyboard => input.handle_key(&key, now),
        WindowEvent::Focus(true) if options.capture_keyboard => input.focus_gained(),
        _ => {}
    }
}
