//! Viewer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tix_bridge::shm::HEADER_SIZE;
use tix_bridge::{ConnectConfig, SessionOptions, TranslatorTiming};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Remote session parameters.
    pub connection: ConnectConfig,
    /// Bridge module settings.
    pub bridge: BridgeSettings,
    /// Input forwarding settings.
    pub input: InputConfig,
    /// Window settings.
    pub display: DisplayConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Bridge module settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Path to the bridge dynamic library.
    pub library_path: PathBuf,
    /// Bytes mapped when the frame segment is first opened.
    pub initial_capacity: usize,
}

/// Input forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward mouse events.
    pub capture_mouse: bool,
    /// Forward keyboard events.
    pub capture_keyboard: bool,
    /// Claim control/alt/meta process-wide while a session window is
    /// in the foreground.
    pub intercept_reserved_keys: bool,
    pub release_debounce_ms: u64,
    pub lock_sync_delay_ms: u64,
    pub attention_step_ms: u64,
}

/// Window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Title template; `{server}`, `{width}` and `{height}` are substituted.
    pub title: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            library_path: PathBuf::from("./libs/rdp/RdpBridge.dll"),
            initial_capacity: HEADER_SIZE + 1920 * 1080 * 4,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            capture_mouse: true,
            capture_keyboard: true,
            intercept_reserved_keys: true,
            release_debounce_ms: 50,
            lock_sync_delay_ms: 100,
            attention_step_ms: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "RDP: {server} ({width}x{height})".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where [`ViewerConfig::load`] got its values from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// No readable file; defaults.
    Missing,
    /// The file did not parse; defaults. Holds the parse error.
    Invalid(String),
}

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults. The source is
    /// returned so the caller can report it once logging is up.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(cfg) => (cfg, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let cfg = Self::default();
        let text = toml::to_string_pretty(&cfg).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Delays used by the input translator.
    pub fn timing(&self) -> TranslatorTiming {
        TranslatorTiming {
            release_debounce: Duration::from_millis(self.input.release_debounce_ms),
            lock_sync_delay: Duration::from_millis(self.input.lock_sync_delay_ms),
            attention_step: Duration::from_millis(self.input.attention_step_ms),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            initial_capacity: self.bridge.initial_capacity,
            timing: self.timing(),
        }
    }

    /// Window title for the configured connection.
    pub fn window_title(&self) -> String {
        let c = &self.connection;
        self.display
            .title
            .replace("{server}", &c.server)
            .replace("{width}", &c.width.to_string())
            .replace("{height}", &c.height.to_string())
    }
}

/// Text of the notice shown when a session drops.
pub fn disconnect_notice(server: &str) -> String {
    format!("Connection to {server} was lost.")
}

// ── Tests ────────────────────────────────────────────────────────
