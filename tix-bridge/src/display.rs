//! Hand-off from the frame channel to whatever puts pixels on screen.

use crate::error::BridgeError;
use crate::shm::{FrameHeader, FrameView};

/// Consumes ready frames. Implementations read the view in place and
/// must not keep its pointer past the call.
pub trait DisplaySink {
    fn present(&mut self, frame: &FrameView<'_>) -> Result<(), BridgeError>;
}

/// A sink that remembers what it was shown.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<FrameHeader>,
    /// First four bytes (one pixel) of every presented frame.
    pub first_pixels: Vec<[u8; 4]>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DisplaySink for RecordingSink {
    fn present(&mut self, frame: &FrameView<'_>) -> Result<(), BridgeError> {
        let mut px = [0u8; 4];
        if let Some(head) = frame.pixels().get(..4) {
            px.copy_from_slice(head);
        }
        self.frames.push(frame.header());
        self.first_pixels.push(px);
        Ok(())
    }
}
