/// Hot key parsing and matching (pure, platform-independent)
pub mod hotkey;

/// CGEventTap wiring on a dedicated run-loop thread
#[cfg(target_os = "macos")]
pub mod tap;

pub use hotkey::{HotkeyAction, HotkeyMatcher};
