use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::rewrite::mode::{system_prompt, RewriteMode};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Errors surfaced by the rewrite client.
///
/// The upstream API has no structured error contract we can rely on, so the
/// classified variants are best-effort for UX messaging; anything that does
/// not match a known pattern collapses to [`RewriteError::Api`].
#[derive(Debug, Error)]
pub enum RewriteError {
    /// API key missing, invalid, or rejected
    #[error("invalid API key - check Vox settings")]
    ApiKey,

    /// Upstream rate limit reached
    #[error("rate limit reached - please wait")]
    RateLimit,

    /// Connection-level failure
    #[error("network error - check your connection")]
    Network,

    /// Response arrived but carried no choices
    #[error("empty response from API - check your model and base URL settings")]
    EmptyResponse,

    /// Choice present but message content was null
    #[error("API returned empty content")]
    EmptyContent,

    /// Catch-all wrapped upstream error
    #[error("API error: {0}")]
    Api(String),
}

/// Classify an upstream API error by code and message sniffing.
///
/// Inspects the error `code` attribute (when the error body carries one),
/// the HTTP status, and substrings of the lowercased message.
#[must_use]
pub fn classify_api_error(status: u16, code: Option<&str>, message: &str) -> RewriteError {
    let message_lower = message.to_lowercase();

    if matches!(code, Some("invalid_api_key" | "401")) || status == 401 {
        return RewriteError::ApiKey;
    }
    if code == Some("429") || status == 429 || message_lower.contains("rate") {
        return RewriteError::RateLimit;
    }
    if message_lower.contains("connection") || message_lower.contains("network") {
        return RewriteError::Network;
    }
    if message_lower.contains("authentication") {
        return RewriteError::ApiKey;
    }
    RewriteError::Api(message.to_owned())
}

impl From<reqwest::Error> for RewriteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            RewriteError::Network
        } else {
            RewriteError::Api(e.to_string())
        }
    }
}

// Wire format of the chat-completion response; only the fields we read.

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

/// Client for an OpenAI-compatible chat-completion endpoint.
///
/// One outbound HTTP call per rewrite; no retries, no explicit timeout
/// beyond the reqwest defaults. A failed call is reported once and the user
/// re-triggers manually.
pub struct RewriteClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: Option<String>,
}

impl RewriteClient {
    #[must_use]
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        let base = self
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Rewrite `text` with the given mode.
    ///
    /// Whitespace-only or empty input is returned unchanged without any
    /// network call.
    ///
    /// # Errors
    /// Returns a classified [`RewriteError`] on transport, auth, rate-limit,
    /// or malformed-response failures.
    pub async fn rewrite(
        &self,
        text: &str,
        mode: RewriteMode,
        thinking_mode: bool,
    ) -> Result<String, RewriteError> {
        if text.trim().is_empty() {
            debug!("skipping rewrite of empty input");
            return Ok(text.to_owned());
        }

        info!(
            model = %self.model,
            mode = mode.key(),
            thinking_mode,
            text_len = text.len(),
            "sending rewrite request"
        );

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(mode, thinking_mode) },
                { "role": "user", "content": text },
            ],
            "temperature": 0.7,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let parsed: ApiErrorBody = serde_json::from_str(&raw).unwrap_or_default();
            let message = parsed.error.message.unwrap_or(raw);
            warn!(status = status.as_u16(), %message, "rewrite request failed");
            return Err(classify_api_error(
                status.as_u16(),
                parsed.error.code.as_deref(),
                &message,
            ));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| RewriteError::Api(e.to_string()))?;

        let Some(choice) = chat.choices.into_iter().next() else {
            return Err(RewriteError::EmptyResponse);
        };
        let Some(content) = choice.message.content else {
            return Err(RewriteError::EmptyContent);
        };

        let result = content.trim().to_owned();
        info!(result_len = result.len(), "rewrite completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RewriteClient {
        RewriteClient::new("sk-test".to_owned(), "gpt-4o-mini".to_owned(), None)
    }

    #[tokio::test]
    async fn empty_input_returns_unchanged_without_network() {
        // No server is running; a network call would error, so Ok proves the
        // short-circuit fired.
        let c = client();
        assert_eq!(c.rewrite("", RewriteMode::Concise, false).await.unwrap(), "");
        assert_eq!(
            c.rewrite("   \n\t", RewriteMode::Concise, true).await.unwrap(),
            "   \n\t"
        );
    }

    #[test]
    fn endpoint_defaults_to_openai() {
        assert_eq!(
            client().endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn endpoint_uses_custom_base_url() {
        let c = RewriteClient::new(
            "k".to_owned(),
            "m".to_owned(),
            Some("https://api.example.com/v1/".to_owned()),
        );
        assert_eq!(c.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn classify_invalid_api_key_code() {
        assert!(matches!(
            classify_api_error(400, Some("invalid_api_key"), "bad key"),
            RewriteError::ApiKey
        ));
        assert!(matches!(
            classify_api_error(401, None, "Incorrect API key provided"),
            RewriteError::ApiKey
        ));
    }

    #[test]
    fn classify_rate_limit() {
        assert!(matches!(
            classify_api_error(429, None, "Too many requests"),
            RewriteError::RateLimit
        ));
        assert!(matches!(
            classify_api_error(400, Some("429"), "slow down"),
            RewriteError::RateLimit
        ));
        assert!(matches!(
            classify_api_error(400, None, "Rate limit exceeded for gpt-4o"),
            RewriteError::RateLimit
        ));
    }

    #[test]
    fn classify_network_substrings() {
        assert!(matches!(
            classify_api_error(500, None, "Connection reset by peer"),
            RewriteError::Network
        ));
        assert!(matches!(
            classify_api_error(502, None, "network unreachable"),
            RewriteError::Network
        ));
    }

    #[test]
    fn classify_authentication_substring() {
        assert!(matches!(
            classify_api_error(403, None, "Authentication failed"),
            RewriteError::ApiKey
        ));
    }

    #[test]
    fn classify_unknown_collapses_to_generic() {
        let err = classify_api_error(500, None, "model overloaded");
        match err {
            RewriteError::Api(msg) => assert_eq!(msg, "model overloaded"),
            other => panic!("expected generic Api error, got {other:?}"),
        }
    }
}
