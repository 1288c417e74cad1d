//! Win32 session window and message pump.
//!
//! The window produces [`WindowEvent`]s that the main loop routes to the
//! session's input translator, and hosts the GDI surface frames are
//! blitted to.

use tix_bridge::input::{KeyEvent, MouseButton};

/// Events produced by the window message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Window close requested (Alt-F4/X button).
    Close,
    /// Client area resized.
    Resize(u32, u32),
    /// Minimized (`false`) or restored (`true`).
    Visible(bool),
    /// Keyboard focus gained or lost.
    Focus(bool),
    /// Mouse moved (client-relative coordinates).
    MouseMove(i32, i32),
    /// Mouse button pressed or released.
    MouseButton {
        button: MouseButton,
        pressed: bool,
        x: i32,
        y: i32,
    },
    /// Second press of a double-click.
    DoubleClick { button: MouseButton, x: i32, y: i32 },
    /// Wheel notch, client-relative position.
    MouseWheel { delta: i16, x: i32, y: i32 },
    /// Key down/up.
    Key(KeyEvent),
}

// ── Message decoding ─────────────────────────────────────────────

/// Signed client coordinates packed into a mouse message's `lParam`.
pub fn point_from_lparam(lparam: isize) -> (i32, i32) {
    let x = (lparam & 0xFFFF) as u16 as i16 as i32;
    let y = ((lparam >> 16) & 0xFFFF) as u16 as i16 as i32;
    (x, y)
}

/// Wheel delta from the high word of `wParam`.
pub fn wheel_delta(wparam: usize) -> i16 {
    ((wparam >> 16) & 0xFFFF) as u16 as i16
}

/// Key event from a keyboard message.
///
/// `lParam` carries the scan code in bits 16-23, the extended flag in
/// bit 24 and the previous key state in bit 30.
pub fn key_from_message(wparam: usize, lparam: isize, is_down: bool) -> KeyEvent {
    KeyEvent {
        virtual_key: (wparam & 0xFFFF) as u16,
        scan_code: ((lparam >> 16) & 0xFF) as u16,
        extended: (lparam >> 24) & 1 == 1,
        is_down,
        repeat: is_down && (lparam >> 30) & 1 == 1,
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use std::sync::mpsc;

    use tix_bridge::WindowId;
    use tix_bridge::input::MouseButton;
    use windows::Win32::Foundation::*;
    use windows::Win32::Graphics::Gdi::ScreenToClient;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::*;
    use windows::core::PCWSTR;

    use super::{WindowEvent, key_from_message, point_from_lparam, wheel_delta};

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Handle to the native window.
    pub struct NativeWindow {
        pub hwnd: HWND,
        event_rx: mpsc::Receiver<WindowEvent>,
    }

    fn button_event(button: MouseButton, pressed: bool, lparam: LPARAM) -> WindowEvent {
        let (x, y) = point_from_lparam(lparam.0);
        WindowEvent::MouseButton {
            button,
            pressed,
            x,
            y,
        }
    }

    fn double_click(button: MouseButton, lparam: LPARAM) -> WindowEvent {
        let (x, y) = point_from_lparam(lparam.0);
        WindowEvent::DoubleClick { button, x, y }
    }

    // The boxed sender lives in GWLP_USERDATA until the window drops.
    unsafe extern "system" fn wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let tx_ptr =
            unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const mpsc::Sender<WindowEvent>;

        if tx_ptr.is_null() {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }

        let tx = unsafe { &*tx_ptr };

        let event = match msg {
            WM_CLOSE => WindowEvent::Close,
            WM_SIZE => {
                if wparam.0 == SIZE_MINIMIZED as usize {
                    let _ = tx.send(WindowEvent::Visible(false));
                    return LRESULT(0);
                }
                let w = (lparam.0 & 0xFFFF) as u32;
                let h = ((lparam.0 >> 16) & 0xFFFF) as u32;
                let _ = tx.send(WindowEvent::Visible(true));
                WindowEvent::Resize(w, h)
            }
            WM_SETFOCUS => WindowEvent::Focus(true),
            WM_KILLFOCUS => WindowEvent::Focus(false),
            WM_MOUSEMOVE => {
                let (x, y) = point_from_lparam(lparam.0);
                WindowEvent::MouseMove(x, y)
            }
            WM_LBUTTONDOWN => button_event(MouseButton::Left, true, lparam),
            WM_LBUTTONUP => button_event(MouseButton::Left, false, lparam),
            WM_RBUTTONDOWN => button_event(MouseButton::Right, true, lparam),
            WM_RBUTTONUP => button_event(MouseButton::Right, false, lparam),
            WM_MBUTTONDOWN => button_event(MouseButton::Middle, true, lparam),
            WM_MBUTTONUP => button_event(MouseButton::Middle, false, lparam),
            WM_LBUTTONDBLCLK => double_click(MouseButton::Left, lparam),
            WM_RBUTTONDBLCLK => double_click(MouseButton::Right, lparam),
            WM_MBUTTONDBLCLK => double_click(MouseButton::Middle, lparam),
            WM_MOUSEWHEEL => {
                // Wheel positions arrive in screen coordinates.
                let (sx, sy) = point_from_lparam(lparam.0);
                let mut pt = POINT { x: sx, y: sy };
                let _ = unsafe { ScreenToClient(hwnd, &mut pt) };
                WindowEvent::MouseWheel {
                    delta: wheel_delta(wparam.0),
                    x: pt.x,
                    y: pt.y,
                }
            }
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                WindowEvent::Key(key_from_message(wparam.0, lparam.0, true))
            }
            WM_KEYUP | WM_SYSKEYUP => WindowEvent::Key(key_from_message(wparam.0, lparam.0, false)),
            WM_DESTROY => {
                unsafe { PostQuitMessage(0) };
                return LRESULT(0);
            }
            _ => return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        };

        let _ = tx.send(event);
        LRESULT(0)
    }

    impl NativeWindow {
        /// Create a top-level window whose client area is `width` x `height`.
        pub fn create(title: &str, width: u32, height: u32) -> Result<Self, String> {
            let (event_tx, event_rx) = mpsc::channel();

            let hinstance =
                unsafe { GetModuleHandleW(None) }.map_err(|e| format!("GetModuleHandle: {e}"))?;

            let class_name_wide = wide("TixViewerClass");

            let wc = WNDCLASSW {
                style: CS_DBLCLKS,
                lpfnWndProc: Some(wndproc),
                hInstance: hinstance.into(),
                lpszClassName: PCWSTR(class_name_wide.as_ptr()),
                hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
                ..Default::default()
            };

            // Later session windows reuse the class.
            let atom = unsafe { RegisterClassW(&wc) };
            if atom == 0 && unsafe { GetLastError() } != ERROR_CLASS_ALREADY_EXISTS {
                return Err("RegisterClassW failed".into());
            }

            let mut frame = RECT {
                left: 0,
                top: 0,
                right: width as i32,
                bottom: height as i32,
            };
            if let Err(e) = unsafe { AdjustWindowRect(&mut frame, WS_OVERLAPPEDWINDOW, FALSE) } {
                tracing::debug!("AdjustWindowRect failed: {e}");
            }

            let title_wide = wide(title);

            let hwnd = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE(0),
                    PCWSTR(class_name_wide.as_ptr()),
                    PCWSTR(title_wide.as_ptr()),
                    WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    frame.right - frame.left,
                    frame.bottom - frame.top,
                    None,
                    None,
                    hinstance,
                    None,
                )
            }
            .map_err(|e| format!("CreateWindowExW failed: {e}"))?;

            if hwnd.is_invalid() {
                return Err("CreateWindowExW returned invalid HWND".into());
            }

            let tx_ptr = Box::into_raw(Box::new(event_tx));
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, tx_ptr as isize);
            }

            Ok(Self { hwnd, event_rx })
        }

        /// Pump this thread's messages (non-blocking) and collect events.
        ///
        /// All thread messages are dispatched, not just this window's, so
        /// the low-level keyboard hook keeps being serviced.
        pub fn poll_events(&self) -> Vec<WindowEvent> {
            unsafe {
                let mut msg = MSG::default();
                while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
            let mut events = Vec::new();
            while let Ok(ev) = self.event_rx.try_recv() {
                events.push(ev);
            }
            events
        }

        /// The raw window handle.
        pub fn hwnd(&self) -> HWND {
            self.hwnd
        }

        /// Identity used for reserved-key routing.
        pub fn id(&self) -> WindowId {
            WindowId::new(self.hwnd.0 as isize)
        }

        pub fn client_size(&self) -> (u32, u32) {
            let mut rect = RECT::default();
            match unsafe { GetClientRect(self.hwnd, &mut rect) } {
                Ok(()) => (
                    (rect.right - rect.left).max(0) as u32,
                    (rect.bottom - rect.top).max(0) as u32,
                ),
                Err(_) => (0, 0),
            }
        }

        /// Show a modal notice owned by this window.
        pub fn show_notice(&self, title: &str, text: &str) {
            let title = wide(title);
            let text = wide(text);
            unsafe {
                MessageBoxW(
                    self.hwnd,
                    PCWSTR(text.as_ptr()),
                    PCWSTR(title.as_ptr()),
                    MB_OK | MB_ICONWARNING,
                );
            }
        }
    }

    impl Drop for NativeWindow {
        fn drop(&mut self) {
            unsafe {
                // Recover and drop the boxed sender.
                let ptr =
                    GetWindowLongPtrW(self.hwnd, GWLP_USERDATA) as *mut mpsc::Sender<WindowEvent>;
                if !ptr.is_null() {
                    SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
                    drop(Box::from_raw(ptr));
                }
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use tix_bridge::WindowId;

    use super::WindowEvent;

    pub struct NativeWindow;

    impl NativeWindow {
        pub fn create(_title: &str, _w: u32, _h: u32) -> Result<Self, String> {
            Err("Window creation is only supported on Windows".into())
        }

        pub fn poll_events(&self) -> Vec<WindowEvent> {
            Vec::new()
        }

        pub fn id(&self) -> WindowId {
            WindowId::new(0)
        }

        pub fn client_size(&self) -> (u32, u32) {
            (0, 0)
        }

        pub fn show_notice(&self, title: &str, text: &str) {
            tracing::warn!("{title}: {text}");
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;
