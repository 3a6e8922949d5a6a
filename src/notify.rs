use tracing::{debug, warn};

use crate::rewrite::{RewriteError, RewriteMode};
use crate::transcription::SpeechError;

const APP_TITLE: &str = "Vox";

/// Escape a string for embedding in an AppleScript literal.
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Show a macOS notification via `osascript`.
///
/// Failures are logged and swallowed; a missed toast must never take the
/// app down.
pub fn show(message: &str) {
    debug!(%message, "showing notification");
    let script = format!(
        "display notification \"{}\" with title \"{}\"",
        escape(message),
        APP_TITLE
    );
    let result = std::process::Command::new("osascript")
        .args(["-e", &script])
        .output();
    if let Err(e) = result {
        warn!(error = %e, "failed to show notification");
    }
}

/// Toast shown when a rewrite finishes and lands on the pasteboard.
#[must_use]
pub fn rewrite_done_message(mode: RewriteMode) -> String {
    format!("{} copied to clipboard", mode.display_name())
}

/// Toast shown when a rewrite is running.
#[must_use]
pub fn rewrite_started_message(mode: RewriteMode) -> String {
    format!("Rewriting as {}...", mode.display_name())
}

pub const NO_API_KEY_MESSAGE: &str = "No API key configured - add one in the config file";
pub const EMPTY_SELECTION_MESSAGE: &str = "Nothing to rewrite - copy some text first";

/// Toast text for a failed rewrite; the error display strings are already
/// phrased for users.
#[must_use]
pub fn rewrite_error_message(error: &RewriteError) -> String {
    error.to_string()
}

/// Toast text for a failed dictation.
#[must_use]
pub fn speech_error_message(error: &SpeechError) -> String {
    error.to_string()
}

/// Toast shown while a whisper model downloads.
#[must_use]
pub fn model_download_message(model: &str) -> String {
    format!("Downloading {model} model...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralizes_quotes_and_backslashes() {
        assert_eq!(escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape(r"a\b"), r"a\\b");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn rewrite_messages_name_the_mode() {
        assert_eq!(
            rewrite_done_message(RewriteMode::Professional),
            "Professional copied to clipboard"
        );
        assert_eq!(
            rewrite_started_message(RewriteMode::FixGrammar),
            "Rewriting as Fix Grammar..."
        );
    }

    #[test]
    fn error_messages_are_user_phrased() {
        let msg = rewrite_error_message(&RewriteError::ApiKey);
        assert!(msg.contains("API key"));

        let msg = rewrite_error_message(&RewriteError::RateLimit);
        assert!(msg.to_lowercase().contains("rate limit"));

        let msg = rewrite_error_message(&RewriteError::Network);
        assert!(msg.to_lowercase().contains("network"));
    }

    #[test]
    fn model_download_message_names_model() {
        assert_eq!(model_download_message("base"), "Downloading base model...");
    }
}
