//! Domain-specific error types for the bridge transport.
//!
//! Fatal conditions (connect failure, missing bridge library) are
//! returned as `Err`. Degraded conditions (notification or hook setup
//! failures) are logged by the caller and never abort a session.

use thiserror::Error;

/// The canonical error type for `tix-bridge`.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Bridge module ────────────────────────────────────────────
    /// The native bridge library could not be loaded.
    #[error("failed to load bridge library {path}: {reason}")]
    LibraryLoad { path: String, reason: String },

    /// The bridge library does not export a required symbol.
    #[error("bridge library is missing symbol `{0}`")]
    MissingSymbol(&'static str),

    /// `connect` returned a null handle.
    #[error("connection to {server}:{port} failed")]
    ConnectFailed { server: String, port: u16 },

    /// The connection handle was already released.
    #[error("connection already released")]
    Released,

    // ── Configuration ────────────────────────────────────────────
    /// A connection parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A string passed to the bridge contains an interior NUL byte.
    #[error("string contains NUL byte: {0}")]
    InvalidString(#[from] std::ffi::NulError),

    // ── Shared memory / notification ─────────────────────────────
    /// The named shared-memory segment could not be mapped.
    #[error("cannot map segment {name} ({capacity} bytes): {reason}")]
    SegmentOpen {
        name: String,
        capacity: usize,
        reason: String,
    },

    /// The named notification primitive could not be opened.
    #[error("cannot open notification {name}: {reason}")]
    NotificationOpen { name: String, reason: String },

    // ── Input ────────────────────────────────────────────────────
    /// The low-level keyboard hook could not be installed.
    #[error("keyboard hook installation failed: {0}")]
    HookInstall(String),

    // ── Display ──────────────────────────────────────────────────
    /// The display sink rejected a frame.
    #[error("display error: {0}")]
    Display(String),

    // ── Misc ─────────────────────────────────────────────────────
    /// An I/O error from the OS layer.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Other(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Other(s.to_string())
    }
}
