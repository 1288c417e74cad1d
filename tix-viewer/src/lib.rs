//! # tix-viewer: session viewer
//!
//! Opens one remote session through the bridge module, renders its
//! frames into a native Win32 window and forwards local mouse and
//! keyboard input back through the bridge.

pub mod config;
pub mod display;
pub mod input;
pub mod window;
