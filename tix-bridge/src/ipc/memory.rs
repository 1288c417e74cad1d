//! In-process [`IpcBackend`].
//!
//! Segments are heap regions registered under a name; a
//! [`SegmentWriter`] plays the producer and [`MemoryEvent`] the
//! auto-reset notification. Mapping more bytes than a segment holds
//! fails, as `MapViewOfFile` does for a smaller mapping.

use std::collections::HashMap;
use std::ptr::{self, NonNull};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use super::{FrameNotifier, IpcBackend, SharedSegment};
use crate::error::BridgeError;
use crate::shm::header::{FrameHeader, HEADER_SIZE};

// ── Region ───────────────────────────────────────────────────────

/// A fixed-size, zeroed heap allocation shared by writer and views.
struct Region {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain bytes; concurrent access follows the same
// single-writer/single-reader discipline as a real shared segment.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    fn new(len: usize) -> Self {
        let boxed: Box<[u8]> = vec![0u8; len].into_boxed_slice();
        let ptr = NonNull::from(Box::leak(boxed)).cast::<u8>();
        Self { ptr, len }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from the leaked boxed slice in `new`.
        unsafe {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

// ── MemorySegment ────────────────────────────────────────────────

/// A view of the first `len` bytes of a named region.
pub struct MemorySegment {
    region: Arc<Region>,
    len: usize,
}

impl SharedSegment for MemorySegment {
    fn base(&self) -> NonNull<u8> {
        self.region.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

// ── SegmentWriter ────────────────────────────────────────────────

/// Producer side of an in-process segment.
#[derive(Clone)]
pub struct SegmentWriter {
    region: Arc<Region>,
}

impl SegmentWriter {
    /// Total size of the segment.
    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// Copy `bytes` into the segment at `offset`.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), BridgeError> {
        let end = offset
            .checked_add(bytes.len())
            .filter(|&end| end <= self.region.len)
            .ok_or_else(|| {
                BridgeError::Other(format!(
                    "write of {} bytes at {offset} exceeds segment of {}",
                    bytes.len(),
                    self.region.len
                ))
            })?;
        debug_assert!(end <= self.region.len);
        // SAFETY: bounds checked above.
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.region.ptr.as_ptr().add(offset),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Overwrite the 16-byte header.
    pub fn write_header(&self, header: &FrameHeader) -> Result<(), BridgeError> {
        self.write(0, &header.encode())
    }

    /// Commit a frame the way the bridge does: pixels first, header last.
    pub fn publish(&self, header: &FrameHeader, pixels: &[u8]) -> Result<(), BridgeError> {
        self.write(HEADER_SIZE, pixels)?;
        std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
        self.write_header(header)
    }
}

// ── MemoryEvent ──────────────────────────────────────────────────

/// Auto-reset event: one `set` releases one successful `wait`.
#[derive(Default)]
pub struct MemoryEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl MemoryEvent {
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        *signaled = true;
        self.cond.notify_one();
    }
}

impl FrameNotifier for MemoryEvent {
    fn wait(&self, timeout: Duration) -> bool {
        let guard = self.signaled.lock().unwrap_or_else(|e| e.into_inner());
        let (mut signaled, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |s| !*s)
            .unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *signaled, false)
    }
}

// ── MemoryIpc ────────────────────────────────────────────────────

#[derive(Default)]
struct Namespace {
    segments: HashMap<String, Arc<Region>>,
    events: HashMap<String, Arc<MemoryEvent>>,
}

/// A private namespace of named segments and events.
#[derive(Clone, Default)]
pub struct MemoryIpc {
    namespace: Arc<Mutex<Namespace>>,
}

impl MemoryIpc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a zeroed segment of `len` bytes.
    pub fn create_segment(&self, name: &str, len: usize) -> SegmentWriter {
        let region = Arc::new(Region::new(len));
        self.lock().segments.insert(name.to_string(), Arc::clone(&region));
        SegmentWriter { region }
    }

    /// Create (or replace) an unsignalled event.
    pub fn create_event(&self, name: &str) -> Arc<MemoryEvent> {
        let event = Arc::new(MemoryEvent::default());
        self.lock().events.insert(name.to_string(), Arc::clone(&event));
        event
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Namespace> {
        self.namespace.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl IpcBackend for MemoryIpc {
    type Segment = MemorySegment;
    type Notifier = Arc<MemoryEvent>;

    fn open_segment(&self, name: &str, capacity: usize) -> Result<MemorySegment, BridgeError> {
        let region = self
            .lock()
            .segments
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::SegmentOpen {
                name: name.to_string(),
                capacity,
                reason: "no such segment".into(),
            })?;

        if capacity > region.len {
            return Err(BridgeError::SegmentOpen {
                name: name.to_string(),
                capacity,
                reason: format!("segment holds only {} bytes", region.len),
            });
        }
        Ok(MemorySegment {
            region,
            len: capacity,
        })
    }

    fn open_notifier(&self, name: &str) -> Result<Arc<MemoryEvent>, BridgeError> {
        self.lock()
            .events
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::NotificationOpen {
                name: name.to_string(),
                reason: "no such event".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_cannot_exceed_segment() {
        let ipc = MemoryIpc::new();
        ipc.create_segment("seg", 64);
        assert!(ipc.open_segment("seg", 64).is_ok());
        assert!(matches!(
            ipc.open_segment("seg", 65),
            Err(BridgeError::SegmentOpen { capacity: 65, .. })
        ));
        assert!(ipc.open_segment("missing", 8).is_err());
    }

    #[test]
    fn writer_bounds_checked() {
        let ipc = MemoryIpc::new();
        let w = ipc.create_segment("seg", 8);
        assert!(w.write(4, &[1, 2, 3, 4]).is_ok());
        assert!(w.write(5, &[1, 2, 3, 4]).is_err());
        assert!(w.write(usize::MAX, &[1]).is_err());
    }

    #[test]
    fn event_auto_resets() {
        let ipc = MemoryIpc::new();
        let producer = ipc.create_event("evt");
        let consumer = ipc.open_notifier("evt").unwrap();

        assert!(!consumer.wait(Duration::from_millis(5)));
        producer.set();
        assert!(consumer.wait(Duration::from_millis(5)));
        assert!(!consumer.wait(Duration::from_millis(5)));
    }

    #[test]
    fn event_wakes_waiting_thread() {
        let ipc = MemoryIpc::new();
        let producer = ipc.create_event("evt");
        let consumer = ipc.open_notifier("evt").unwrap();

        let waiter = std::thread::spawn(move || consumer.wait(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(20));
        producer.set();
        assert!(waiter.join().unwrap());
    }
}
