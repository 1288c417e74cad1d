//! Consumer side of the shared-memory frame protocol.
//!
//! The bridge writes a [`FrameHeader`] at offset 0 followed by the BGRA
//! pixel rows. [`FrameChannel`] reads the header on every check, grows
//! its mapping when a frame no longer fits, and hands the pixel region
//! out as a borrowed [`FrameView`] without copying it.
//!
//! No lock guards the segment. The producer commits pixels before the
//! header; this side always reads the header first. A producer that
//! breaks that order can produce a torn frame, and nothing here hides it.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{Ordering, fence};

use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::ipc::{IpcBackend, SharedSegment};

pub mod header;

pub use header::{BYTES_PER_PIXEL, FrameHeader, HEADER_SIZE};

/// Header re-reads allowed per check while the mapping is growing.
const MAX_REMAP_ATTEMPTS: usize = 3;

// ── FrameCheck ───────────────────────────────────────────────────

/// Result of [`FrameChannel::check_new_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCheck {
    pub is_new: bool,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub frame_id: u32,
}

impl FrameCheck {
    fn none(last_frame_id: u32) -> Self {
        Self {
            is_new: false,
            width: 0,
            height: 0,
            stride: 0,
            frame_id: last_frame_id,
        }
    }

    fn from_header(is_new: bool, h: FrameHeader) -> Self {
        Self {
            is_new,
            width: h.width,
            height: h.height,
            stride: h.stride,
            frame_id: h.frame_id,
        }
    }
}

// ── FrameView ────────────────────────────────────────────────────

/// The most recent new frame, borrowed from the channel.
///
/// Holding a view keeps the channel borrowed, so the mapping cannot be
/// grown or closed underneath it.
pub struct FrameView<'a> {
    header: FrameHeader,
    pixels: NonNull<u8>,
    len: usize,
    _segment: PhantomData<&'a [u8]>,
}

impl<'a> FrameView<'a> {
    pub fn header(&self) -> FrameHeader {
        self.header
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    /// Effective bytes per row.
    pub fn row_bytes(&self) -> usize {
        self.len / (self.header.height as usize).max(1)
    }

    pub fn frame_id(&self) -> u32 {
        self.header.frame_id
    }

    /// Start of the first pixel row.
    pub fn as_ptr(&self) -> *const u8 {
        self.pixels.as_ptr()
    }

    /// The pixel rows, read in place.
    ///
    /// The producer does not wait for readers: while the slice is held
    /// its bytes can change under it, and a read may mix rows of two
    /// frames. Presenting a frame torn this way is accepted; use
    /// [`copy_pixels`](Self::copy_pixels) for a snapshot that stays put.
    pub fn pixels(&self) -> &'a [u8] {
        // SAFETY: `len` bytes past `pixels` lie inside the mapping
        // (checked against capacity in `FrameChannel::frame`), and the
        // mapping outlives `'a`.
        unsafe { std::slice::from_raw_parts(self.pixels.as_ptr(), self.len) }
    }

    /// Copy the pixel rows into `dst`, replacing its contents. The copy
    /// is private to the caller; it can still be torn if the producer
    /// commits while it runs.
    pub fn copy_pixels(&self, dst: &mut Vec<u8>) {
        dst.clear();
        dst.resize(self.len, 0);
        // SAFETY: `len` readable bytes at `pixels` (see `pixels`); `dst`
        // holds `len` bytes of its own.
        unsafe { ptr::copy_nonoverlapping(self.pixels.as_ptr(), dst.as_mut_ptr(), self.len) }
    }
}

// ── FrameChannel ─────────────────────────────────────────────────

/// Reader of one session's frame segment.
pub struct FrameChannel<B: IpcBackend> {
    backend: B,
    name: String,
    segment: Option<B::Segment>,
    capacity: usize,
    current: Option<FrameHeader>,
    remaps: u32,
}

impl<B: IpcBackend> FrameChannel<B> {
    /// Map the segment called `name`, `capacity_hint` bytes if the
    /// segment is that large, otherwise just the header.
    pub fn open(backend: B, name: &str, capacity_hint: usize) -> Result<Self, BridgeError> {
        let hint = capacity_hint.max(HEADER_SIZE);
        let segment = match backend.open_segment(name, hint) {
            Ok(segment) => segment,
            Err(e) if hint > HEADER_SIZE => {
                debug!(%name, hint, error = %e, "mapping header only");
                backend.open_segment(name, HEADER_SIZE)?
            }
            Err(e) => return Err(e),
        };
        let capacity = segment.len();
        info!(%name, capacity, "frame segment mapped");

        Ok(Self {
            backend,
            name: name.to_string(),
            segment: Some(segment),
            capacity,
            current: None,
            remaps: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes currently mapped. Never decreases while open.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of times the mapping was grown.
    pub fn remap_count(&self) -> u32 {
        self.remaps
    }

    pub fn is_closed(&self) -> bool {
        self.segment.is_none()
    }

    /// Segment base address, valid until the next growth or close.
    pub fn current_base_address(&self) -> Option<NonNull<u8>> {
        self.segment.as_ref().map(|s| s.base())
    }

    fn read_header(&self) -> Option<FrameHeader> {
        let segment = self.segment.as_ref()?;
        if segment.len() < HEADER_SIZE {
            return None;
        }
        // SAFETY: at least HEADER_SIZE bytes are mapped at `base`; the
        // array has alignment 1.
        let raw = unsafe { ptr::read_volatile(segment.base().as_ptr().cast::<[u8; HEADER_SIZE]>()) };
        fence(Ordering::Acquire);
        FrameHeader::decode(&raw)
    }

    /// Read the header and report whether a frame other than
    /// `last_frame_id` is available, growing the mapping first if the
    /// frame does not fit.
    ///
    /// Any [`FrameView`] obtained before this call is invalidated.
    pub fn check_new_frame(&mut self, last_frame_id: u32) -> FrameCheck {
        for _ in 0..MAX_REMAP_ATTEMPTS {
            let Some(header) = self.read_header() else {
                return FrameCheck::none(last_frame_id);
            };
            let is_new = header.has_frame() && header.frame_id != last_frame_id;
            if !is_new {
                return FrameCheck::from_header(false, header);
            }

            let Some(required) = header.required_capacity() else {
                warn!(?header, "frame size overflows address space");
                return FrameCheck::none(last_frame_id);
            };
            if required > self.capacity {
                if let Err(e) = self.grow(required) {
                    warn!(name = %self.name, required, error = %e, "segment remap failed");
                    return FrameCheck::none(last_frame_id);
                }
                // The header may have moved on while remapping.
                continue;
            }

            self.current = Some(header);
            return FrameCheck::from_header(true, header);
        }
        debug!(name = %self.name, "frame kept outgrowing mapping; retry on next signal");
        FrameCheck::none(last_frame_id)
    }

    fn grow(&mut self, required: usize) -> Result<(), BridgeError> {
        let target = required.max(self.capacity);
        self.current = None;
        let segment = self.backend.open_segment(&self.name, target)?;
        // New view mapped before the old one is dropped.
        self.capacity = segment.len().max(self.capacity);
        self.segment = Some(segment);
        self.remaps += 1;
        info!(name = %self.name, capacity = self.capacity, "frame segment remapped");
        Ok(())
    }

    /// The frame accepted by the last successful check.
    pub fn frame(&self) -> Option<FrameView<'_>> {
        let segment = self.segment.as_ref()?;
        let header = self.current?;
        let len = header.pixel_len()?;
        if header.required_capacity()? > segment.len() {
            return None;
        }
        // SAFETY: HEADER_SIZE <= required_capacity <= mapped length.
        let pixels = unsafe { NonNull::new_unchecked(segment.base().as_ptr().add(HEADER_SIZE)) };
        Some(FrameView {
            header,
            pixels,
            len,
            _segment: PhantomData,
        })
    }

    /// Unmap the segment. Later checks report no frame; repeated calls
    /// are no-ops.
    pub fn close(&mut self) {
        self.current = None;
        if self.segment.take().is_some() {
            debug!(name = %self.name, "frame segment unmapped");
        }
    }
}

impl<B: IpcBackend> Drop for FrameChannel<B> {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
