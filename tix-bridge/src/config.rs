//! Connection parameters handed to the bridge at connect time.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Color depths the bridge accepts, in bits per pixel.
pub const SUPPORTED_COLOR_DEPTHS: [u32; 3] = [16, 24, 32];

/// Plain connection record produced by the setup dialog or CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Remote host name or IP address.
    pub server: String,
    /// Remote port.
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Requested desktop width in pixels.
    pub width: u32,
    /// Requested desktop height in pixels.
    pub height: u32,
    /// Bits per pixel: 16, 24 or 32.
    pub color_depth: u32,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.2".into(),
            port: 3389,
            username: "Admin".into(),
            password: String::new(),
            width: 800,
            height: 600,
            color_depth: 16,
        }
    }
}

impl ConnectConfig {
    /// Reject parameters the bridge cannot use.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.server.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("server address is empty".into()));
        }
        if self.port == 0 {
            return Err(BridgeError::InvalidConfig("port must be non-zero".into()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(BridgeError::InvalidConfig(format!(
                "resolution {}x{} is empty",
                self.width, self.height
            )));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(BridgeError::InvalidConfig(format!(
                "resolution {}x{} is too large",
                self.width, self.height
            )));
        }
        if !SUPPORTED_COLOR_DEPTHS.contains(&self.color_depth) {
            return Err(BridgeError::InvalidConfig(format!(
                "color depth {} not in {:?}",
                self.color_depth, SUPPORTED_COLOR_DEPTHS
            )));
        }
        Ok(())
    }
}

/// Parse a resolution string such as `1024x768`, `1024*768`,
/// `1024 768` or `1024,768`.
pub fn parse_resolution(text: &str) -> Result<(u32, u32), BridgeError> {
    let lowered = text.trim().to_ascii_lowercase();
    let mut parts = lowered
        .split(|c: char| c == 'x' || c == '*' || c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty());

    let bad = || BridgeError::InvalidConfig(format!("bad resolution `{text}` (example: 1024x768)"));
    let width = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    let height = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
    Ok((width, height))
}
