//! Tauri command handlers
//!
//! IPC command handlers the webview calls through Tauri's invoke system.

pub mod recording;
