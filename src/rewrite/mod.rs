/// Rewrite presets and prompt assembly
pub mod mode;

/// OpenAI-compatible chat-completion client
pub mod client;

pub use client::{RewriteClient, RewriteError};
pub use mode::RewriteMode;
