//! Recording [`HostBridge`] for tests.
//!
//! Stands in for the native bridge module without a remote server:
//! every call is appended to a log, and `step` results can be scripted.

use std::collections::VecDeque;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::time::Duration;

use super::{HostBridge, RawHandle};
use crate::config::ConnectConfig;
use crate::error::BridgeError;
use crate::input::types::{KeyFlags, LockFlags, MouseAction};

/// One recorded bridge call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCall {
    Connect,
    Step,
    Scancode { scancode: u16, flags: u8 },
    Mouse { action: MouseAction, x: i32, y: i32 },
    SyncLocks(u8),
    Free,
}

/// A fake bridge module that records what it is asked to do.
pub struct MockBridge {
    accept: bool,
    shm_name: String,
    event_name: String,
    steps: Mutex<VecDeque<i32>>,
    step_delay: Duration,
    calls: Mutex<Vec<BridgeCall>>,
}

impl MockBridge {
    /// A bridge that accepts connections and stays alive.
    pub fn new() -> Self {
        Self::with_names("Local\\RdpBridgeMem_mock", "Local\\RdpBridgeEvent_mock")
    }

    /// A bridge whose sessions report the given resource names.
    pub fn with_names(shm_name: &str, event_name: &str) -> Self {
        Self {
            accept: true,
            shm_name: shm_name.to_string(),
            event_name: event_name.to_string(),
            steps: Mutex::new(VecDeque::new()),
            step_delay: Duration::from_millis(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A bridge whose `connect` always returns null.
    pub fn refusing() -> Self {
        Self {
            accept: false,
            ..Self::new()
        }
    }

    /// Queue results for upcoming `step` calls. Once the queue is
    /// drained, `step` reports alive.
    pub fn script_steps(self, results: impl IntoIterator<Item = i32>) -> Self {
        self.steps
            .lock()
            .expect("lock poisoned")
            .extend(results);
        self
    }

    /// How long each `step` call blocks before returning.
    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    fn record(&self, call: BridgeCall) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<BridgeCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Input calls only (no connect/step/free).
    pub fn inputs(&self) -> Vec<BridgeCall> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    BridgeCall::Scancode { .. } | BridgeCall::Mouse { .. } | BridgeCall::SyncLocks(_)
                )
            })
            .collect()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&BridgeCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.calls.lock().expect("lock poisoned").clear();
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBridge for MockBridge {
    fn connect(&self, _config: &ConnectConfig) -> Result<Option<RawHandle>, BridgeError> {
        self.record(BridgeCall::Connect);
        if !self.accept {
            return Ok(None);
        }
        // Any non-null token will do; it is never dereferenced.
        Ok(RawHandle::from_ptr(NonNull::<c_void>::dangling().as_ptr()))
    }

    fn step(&self, _handle: RawHandle) -> i32 {
        self.record(BridgeCall::Step);
        std::thread::sleep(self.step_delay);
        self.steps
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or(1)
    }

    fn send_scancode(&self, _handle: RawHandle, scancode: u16, flags: KeyFlags) {
        self.record(BridgeCall::Scancode {
            scancode,
            flags: flags.bits(),
        });
    }

    fn send_mouse(&self, _handle: RawHandle, action: MouseAction, x: i32, y: i32) {
        self.record(BridgeCall::Mouse { action, x, y });
    }

    fn sync_locks(&self, _handle: RawHandle, flags: LockFlags) {
        self.record(BridgeCall::SyncLocks(flags.bits()));
    }

    fn shm_name(&self, _handle: RawHandle) -> String {
        self.shm_name.clone()
    }

    fn event_name(&self, _handle: RawHandle) -> String {
        self.event_name.clone()
    }

    fn free(&self, _handle: RawHandle) {
        self.record(BridgeCall::Free);
    }
}
