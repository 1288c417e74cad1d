//! The 16-byte frame header at offset 0 of the segment.
//!
//! ```text
//! offset  size  field
//! 0       4     width     (u32 LE)
//! 4       4     height    (u32 LE)
//! 8       4     stride    (u32 LE, bytes per row)
//! 12      4     frame_id  (u32 LE)
//! 16      ..    pixels, B,G,R,A, `stride` bytes per row
//! ```

/// Size of the encoded header.
pub const HEADER_SIZE: usize = 16;

/// Bytes per pixel (BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub frame_id: u32,
}

impl FrameHeader {
    pub const fn new(width: u32, height: u32, stride: u32, frame_id: u32) -> Self {
        Self {
            width,
            height,
            stride,
            frame_id,
        }
    }

    /// Header for a tightly packed frame (`stride == width * 4`).
    pub const fn packed(width: u32, height: u32, frame_id: u32) -> Self {
        Self::new(width, height, width.saturating_mul(4), frame_id)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.width.to_le_bytes());
        buf[4..8].copy_from_slice(&self.height.to_le_bytes());
        buf[8..12].copy_from_slice(&self.stride.to_le_bytes());
        buf[12..16].copy_from_slice(&self.frame_id.to_le_bytes());
        buf
    }

    /// Decode from the first 16 bytes of `data`. `None` if short.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let raw: &[u8; HEADER_SIZE] = data.get(..HEADER_SIZE)?.try_into().ok()?;
        let field = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        Some(Self {
            width: field(0),
            height: field(4),
            stride: field(8),
            frame_id: field(12),
        })
    }

    /// `width == 0` means no frame has been written yet.
    pub fn has_frame(&self) -> bool {
        self.width > 0
    }

    /// Bytes per row: the stride, or `width * 4` if the stride is smaller.
    pub fn row_bytes(&self) -> Option<usize> {
        let packed = (self.width as usize).checked_mul(BYTES_PER_PIXEL)?;
        Some(packed.max(self.stride as usize))
    }

    /// Length of the pixel region.
    pub fn pixel_len(&self) -> Option<usize> {
        self.row_bytes()?.checked_mul(self.height as usize)
    }

    /// Segment bytes needed to read this frame.
    pub fn required_capacity(&self) -> Option<usize> {
        self.pixel_len()?.checked_add(HEADER_SIZE)
    }
}
