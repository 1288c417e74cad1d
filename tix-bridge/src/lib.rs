//! # tix-bridge
//!
//! Frame transport and input injection between a local viewer and the
//! external session-bridge module.
//!
//! This crate contains:
//! - **Bridge**: the `HostBridge` contract, its dynamic-library loader and
//!   the guarded `BridgeConnection`
//! - **Shm**: `FrameChannel`, the header-framed shared-memory consumer
//! - **Ipc**: named segment/notification backends (Win32 and in-process)
//! - **Notify**: `NotificationWatcher`, the blocking frame-signal loop
//! - **Heartbeat**: `ConnectionHeartbeat`, the liveness loop
//! - **Input**: `InputTranslator` with release debounce and lock sync
//! - **Intercept**: `KeyInterceptor`, the process-wide reserved-key hook
//! - **Session**: `Session` with ordered teardown and `SessionRegistry`
//! - **Error**: `BridgeError`, a `thiserror`-based error enum

pub mod bridge;
pub mod config;
pub mod display;
pub mod error;
pub mod heartbeat;
pub mod input;
pub mod intercept;
pub mod ipc;
pub mod notify;
pub mod session;
pub mod shm;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{BridgeConnection, HostBridge, MockBridge, NativeBridge};
pub use config::{ConnectConfig, parse_resolution};
pub use display::DisplaySink;
pub use error::BridgeError;
pub use heartbeat::ConnectionHeartbeat;
pub use input::{InputTranslator, KeyForwarder, LocalKeyboard, TranslatorTiming};
pub use intercept::{HookDecision, HookInstaller, KeyInterceptor, WindowId};
pub use ipc::{IpcBackend, MemoryIpc};
pub use notify::NotificationWatcher;
pub use session::{Session, SessionEvent, SessionId, SessionOptions, SessionRegistry};
pub use shm::{FrameChannel, FrameCheck, FrameHeader, FrameView};

#[cfg(target_os = "windows")]
pub use input::Win32Keyboard;
#[cfg(target_os = "windows")]
pub use intercept::LowLevelHook;
#[cfg(target_os = "windows")]
pub use ipc::Win32Ipc;
