//! Vox - macOS menu-bar clipboard rewriter with local dictation.
//!
//! This library exports core modules for testing and potential future reuse.

/// Audio capture and processing
pub mod audio;
/// Configuration management
pub mod config;
/// Keyboard input (hot key matching, event tap)
pub mod input;
/// Toast notifications via osascript
pub mod notify;
/// NSPasteboard access
#[cfg(target_os = "macos")]
pub mod pasteboard;
/// macOS permission checks
pub mod permissions;
/// Rewrite presets and the chat-completion client
pub mod rewrite;
/// Clipboard rewrite pipeline
pub mod service;
/// Telemetry and logging
pub mod telemetry;
/// Menu-bar tray icon and menu
#[cfg(target_os = "macos")]
pub mod tray;
/// Whisper transcription engine
pub mod transcription;
