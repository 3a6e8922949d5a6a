use tracing::{info, warn};

use crate::notify;
use crate::rewrite::{RewriteError, RewriteMode};

/// Rewrite backend, abstracted so the service pipeline can be tested with
/// a mock instead of a live API.
#[cfg_attr(test, mockall::automock)]
pub trait Rewriter {
    async fn rewrite(
        &self,
        text: &str,
        mode: RewriteMode,
        thinking_mode: bool,
    ) -> Result<String, RewriteError>;
}

impl Rewriter for crate::rewrite::RewriteClient {
    async fn rewrite(
        &self,
        text: &str,
        mode: RewriteMode,
        thinking_mode: bool,
    ) -> Result<String, RewriteError> {
        Self::rewrite(self, text, mode, thinking_mode).await
    }
}

/// Pasteboard access, abstracted for the same reason; the real
/// implementation lives in [`crate::pasteboard`].
#[cfg_attr(test, mockall::automock)]
pub trait Clipboard {
    fn read_text(&self) -> Option<String>;
    fn write_text(&self, text: &str) -> bool;
}

/// NSPasteboard-backed clipboard.
#[cfg(target_os = "macos")]
pub struct SystemClipboard;

#[cfg(target_os = "macos")]
impl Clipboard for SystemClipboard {
    fn read_text(&self) -> Option<String> {
        crate::pasteboard::read_text()
    }

    fn write_text(&self, text: &str) -> bool {
        crate::pasteboard::write_text(text)
    }
}

/// Pasteboard rewrite pipeline: read, rewrite, write back.
///
/// Every failure is converted into a toast message at this boundary;
/// nothing propagates to the caller. The provider is immutable once built;
/// a key, model, base-url, or thinking-mode change rebuilds it wholesale,
/// which keeps it freely shareable with in-flight rewrite tasks.
pub struct ServiceProvider<R, C> {
    rewriter: Option<R>,
    clipboard: C,
    thinking_mode: bool,
}

impl<R: Rewriter, C: Clipboard> ServiceProvider<R, C> {
    #[must_use]
    pub const fn new(rewriter: Option<R>, clipboard: C, thinking_mode: bool) -> Self {
        Self {
            rewriter,
            clipboard,
            thinking_mode,
        }
    }

    /// Run one rewrite over the clipboard contents and return the toast
    /// message describing the outcome.
    pub async fn handle(&self, mode: RewriteMode) -> String {
        let Some(rewriter) = &self.rewriter else {
            warn!("rewrite requested without an API key");
            return notify::NO_API_KEY_MESSAGE.to_owned();
        };

        let Some(text) = self.clipboard.read_text().filter(|t| !t.trim().is_empty()) else {
            return notify::EMPTY_SELECTION_MESSAGE.to_owned();
        };

        info!(mode = mode.key(), text_len = text.len(), "handling rewrite");

        let rewritten = match rewriter.rewrite(&text, mode, self.thinking_mode).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "rewrite failed");
                return notify::rewrite_error_message(&e);
            }
        };

        if !self.clipboard.write_text(&rewritten) {
            warn!("failed to write rewrite result to pasteboard");
            return "Failed to copy result to clipboard".to_owned();
        }

        notify::rewrite_done_message(mode)
    }
}

/// Refresh the system services cache so menu entries appear without a
/// re-login. The service definitions themselves live in the app bundle.
pub fn flush_services_cache() {
    let result = std::process::Command::new("/System/Library/CoreServices/pbs")
        .arg("-flush")
        .output();
    match result {
        Ok(output) if output.status.success() => info!("services cache flushed"),
        Ok(output) => warn!(status = ?output.status, "pbs -flush reported failure"),
        Err(e) => warn!(error = %e, "failed to run pbs -flush"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clipboard_with(content: Option<&str>, write_ok: bool) -> MockClipboard {
        let mut clipboard = MockClipboard::new();
        let content = content.map(str::to_owned);
        clipboard.expect_read_text().return_const(content);
        clipboard.expect_write_text().return_const(write_ok);
        clipboard
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits() {
        let mut clipboard = MockClipboard::new();
        clipboard.expect_read_text().never();

        let provider: ServiceProvider<MockRewriter, _> =
            ServiceProvider::new(None, clipboard, false);
        let msg = provider.handle(RewriteMode::Concise).await;
        assert_eq!(msg, notify::NO_API_KEY_MESSAGE);
    }

    #[tokio::test]
    async fn empty_clipboard_reports_without_api_call() {
        let mut rewriter = MockRewriter::new();
        rewriter.expect_rewrite().never();

        let provider = ServiceProvider::new(Some(rewriter), clipboard_with(None, true), false);
        let msg = provider.handle(RewriteMode::Concise).await;
        assert_eq!(msg, notify::EMPTY_SELECTION_MESSAGE);

        let mut rewriter = MockRewriter::new();
        rewriter.expect_rewrite().never();
        let provider =
            ServiceProvider::new(Some(rewriter), clipboard_with(Some("   \n"), true), false);
        let msg = provider.handle(RewriteMode::Concise).await;
        assert_eq!(msg, notify::EMPTY_SELECTION_MESSAGE);
    }

    #[tokio::test]
    async fn successful_rewrite_lands_on_clipboard() {
        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .withf(|text, mode, thinking| {
                text == "helo world" && *mode == RewriteMode::FixGrammar && !thinking
            })
            .returning(|_, _, _| Ok("hello world".to_owned()));

        let mut clipboard = MockClipboard::new();
        clipboard
            .expect_read_text()
            .return_const(Some("helo world".to_owned()));
        clipboard
            .expect_write_text()
            .withf(|text| text == "hello world")
            .return_const(true);

        let provider = ServiceProvider::new(Some(rewriter), clipboard, false);
        let msg = provider.handle(RewriteMode::FixGrammar).await;
        assert_eq!(msg, notify::rewrite_done_message(RewriteMode::FixGrammar));
    }

    #[tokio::test]
    async fn api_error_becomes_toast_message() {
        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .returning(|_, _, _| Err(RewriteError::RateLimit));

        let provider =
            ServiceProvider::new(Some(rewriter), clipboard_with(Some("text"), true), false);
        let msg = provider.handle(RewriteMode::Professional).await;
        assert_eq!(msg, RewriteError::RateLimit.to_string());
    }

    #[tokio::test]
    async fn clipboard_write_failure_is_reported() {
        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .returning(|_, _, _| Ok("rewritten".to_owned()));

        let provider =
            ServiceProvider::new(Some(rewriter), clipboard_with(Some("text"), false), false);
        let msg = provider.handle(RewriteMode::Friendly).await;
        assert!(msg.contains("Failed to copy"));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn provider_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ServiceProvider<crate::rewrite::RewriteClient, SystemClipboard>>();
    }

    #[tokio::test]
    async fn thinking_mode_is_forwarded() {
        let mut rewriter = MockRewriter::new();
        rewriter
            .expect_rewrite()
            .withf(|_, _, thinking| *thinking)
            .returning(|_, _, _| Ok("out".to_owned()));

        let provider =
            ServiceProvider::new(Some(rewriter), clipboard_with(Some("in"), true), true);
        let msg = provider.handle(RewriteMode::Concise).await;
        assert_eq!(msg, notify::rewrite_done_message(RewriteMode::Concise));
    }
}
