//! OS primitives the frame path is built on: a named shared-memory
//! segment and a named auto-reset notification.
//!
//! | Backend                | Segment                  | Notification          |
//! |------------------------|--------------------------|-----------------------|
//! | [`windows::Win32Ipc`]  | `OpenFileMappingW` view  | `OpenEventW` event    |
//! | [`memory::MemoryIpc`]  | heap region by name      | condvar auto-reset    |

use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BridgeError;

pub mod memory;
#[cfg(target_os = "windows")]
pub mod windows;

pub use memory::{MemoryEvent, MemoryIpc, SegmentWriter};
#[cfg(target_os = "windows")]
pub use windows::Win32Ipc;

/// A read-only view of a named shared-memory segment.
///
/// Dropping the value unmaps the view.
pub trait SharedSegment {
    /// Process-local base address of the view.
    fn base(&self) -> NonNull<u8>;

    /// Number of bytes mapped.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A named auto-reset signal set by the producer on every frame commit.
pub trait FrameNotifier {
    /// Block until signalled or `timeout` elapses. `true` if signalled;
    /// a successful wait resets the signal.
    fn wait(&self, timeout: Duration) -> bool;
}

impl<T: FrameNotifier + ?Sized> FrameNotifier for Arc<T> {
    fn wait(&self, timeout: Duration) -> bool {
        (**self).wait(timeout)
    }
}

/// Opens the per-connection resources by the names the bridge reports.
pub trait IpcBackend: Clone {
    type Segment: SharedSegment;
    type Notifier: FrameNotifier + Send + 'static;

    /// Map `capacity` bytes of the segment called `name`.
    fn open_segment(&self, name: &str, capacity: usize) -> Result<Self::Segment, BridgeError>;

    /// Open the notification called `name` for waiting.
    fn open_notifier(&self, name: &str) -> Result<Self::Notifier, BridgeError>;
}
