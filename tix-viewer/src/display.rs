//! GDI sink: blits ready frames from the shared segment to the window.
//!
//! Frames are read in place from the mapped view; the stride may exceed
//! `width * 4`, so the DIB is described with the stride as its width and
//! only the visible columns are copied. That needs whole-pixel rows: a
//! stride that is not a multiple of 4 is refused.

use tix_bridge::BridgeError;
use tix_bridge::shm::FrameView;

/// Source rectangle and DIB width for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitGeometry {
    /// DIB row length in pixels (stride / 4).
    pub dib_width: i32,
    pub src_width: i32,
    pub src_height: i32,
}

impl BlitGeometry {
    /// `Ok(None)` when there is nothing to draw.
    pub fn of(frame: &FrameView<'_>) -> Result<Option<Self>, BridgeError> {
        let row_bytes = frame.row_bytes();
        if row_bytes % 4 != 0 {
            return Err(BridgeError::Display(format!(
                "row stride {row_bytes} is not a whole number of pixels"
            )));
        }
        let fits = |v: usize| i32::try_from(v).ok();
        let (Some(dib_width), Some(src_width), Some(src_height)) = (
            fits(row_bytes / 4),
            fits(frame.width() as usize),
            fits(frame.height() as usize),
        ) else {
            return Ok(None);
        };
        if dib_width == 0 || src_height == 0 {
            return Ok(None);
        }
        Ok(Some(Self {
            dib_width,
            src_width,
            src_height,
        }))
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use tix_bridge::shm::FrameView;
    use tix_bridge::{BridgeError, DisplaySink};
    use windows::Win32::Foundation::*;
    use windows::Win32::Graphics::Gdi::*;

    use super::BlitGeometry;
    use crate::window::NativeWindow;

    /// Stretches BGRA8 frames over a window's client area using GDI.
    pub struct GdiSink {
        hwnd: HWND,
        width: u32,
        height: u32,
    }

    impl GdiSink {
        /// Create a sink targeting the given window.
        pub fn new(hwnd: HWND, width: u32, height: u32) -> Self {
            Self { hwnd, width, height }
        }

        /// A sink covering the window's current client area.
        pub fn for_window(window: &NativeWindow) -> Self {
            let (width, height) = window.client_size();
            Self::new(window.hwnd(), width, height)
        }

        /// Update the target size (call after WM_SIZE).
        pub fn resize(&mut self, width: u32, height: u32) {
            self.width = width;
            self.height = height;
        }
    }

    impl DisplaySink for GdiSink {
        fn present(&mut self, frame: &FrameView<'_>) -> Result<(), BridgeError> {
            let Some(geo) = BlitGeometry::of(frame)? else {
                return Ok(());
            };

            unsafe {
                let hdc = GetDC(self.hwnd);
                if hdc.is_invalid() {
                    return Err(BridgeError::Display("GetDC failed".into()));
                }

                let bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: geo.dib_width,
                        // Negative height = top-down DIB (origin at top-left).
                        biHeight: -geo.src_height,
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    bmiColors: [RGBQUAD::default(); 1],
                };

                SetStretchBltMode(hdc, COLORONCOLOR);
                let lines = StretchDIBits(
                    hdc,
                    0,
                    0,
                    self.width as i32,
                    self.height as i32,
                    0,
                    0,
                    geo.src_width,
                    geo.src_height,
                    Some(frame.as_ptr().cast()),
                    &bmi,
                    DIB_RGB_COLORS,
                    SRCCOPY,
                );

                ReleaseDC(self.hwnd, hdc);

                if lines == 0 {
                    return Err(BridgeError::Display("StretchDIBits copied nothing".into()));
                }
            }

            Ok(())
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use tix_bridge::shm::FrameView;
    use tix_bridge::{BridgeError, DisplaySink};

    use crate::window::NativeWindow;

    pub struct GdiSink;

    impl GdiSink {
        pub fn for_window(_window: &NativeWindow) -> Self {
            Self
        }

        pub fn resize(&mut self, _w: u32, _h: u32) {}
    }

    impl DisplaySink for GdiSink {
        fn present(&mut self, _frame: &FrameView<'_>) -> Result<(), BridgeError> {
            Err(BridgeError::Display(
                "Display rendering is only supported on Windows".into(),
            ))
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;

#[cfg(test)]
mod tests {
    use tix_bridge::shm::HEADER_SIZE;
    use tix_bridge::{FrameChannel, FrameHeader, MemoryIpc};

    use super::*;

    fn geometry_for(header: FrameHeader) -> Result<Option<BlitGeometry>, BridgeError> {
        let ipc = MemoryIpc::new();
        let writer = ipc.create_segment("frames", HEADER_SIZE + 4096 * 64);
        let mut channel = FrameChannel::open(ipc.clone(), "frames", HEADER_SIZE + 4096 * 64).unwrap();
        writer.write_header(&header).unwrap();
        channel.check_new_frame(0);
        let frame = channel.frame().unwrap();
        BlitGeometry::of(&frame)
    }

    #[test]
    fn padded_rows_widen_the_dib() {
        let geo = geometry_for(FrameHeader::new(1000, 10, 4096, 1)).unwrap().unwrap();
        assert_eq!(geo.dib_width, 1024);
        assert_eq!(geo.src_width, 1000);
        assert_eq!(geo.src_height, 10);
    }

    #[test]
    fn packed_rows_use_frame_width() {
        let geo = geometry_for(FrameHeader::packed(640, 48, 1)).unwrap().unwrap();
        assert_eq!(geo.dib_width, 640);
        assert_eq!(geo.src_width, 640);
    }

    #[test]
    fn odd_stride_is_refused() {
        let err = geometry_for(FrameHeader::new(1000, 10, 4002, 1)).unwrap_err();
        assert!(matches!(err, BridgeError::Display(ref m) if m.contains("4002")));
    }
}
