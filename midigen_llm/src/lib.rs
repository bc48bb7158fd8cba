// LLM gateway contract used by the MidiGen intent extractor.
//
// The pipeline treats every language-model provider through one synchronous
// call: `call(system_prompt, user_prompt, timeout) -> Result<String, LlmError>`.
// Provider selection, fallback chains and SDK quirks live behind this trait,
// never inside the pipeline.
//
// Module overview:
// - `lib.rs`:  The `LlmGateway` trait, `LlmError`, `OfflineGateway` (always
//              unavailable, forces the keyword fallback) and response helpers.
// - `http.rs`: `HttpGateway`, a blocking client for OpenAI-compatible
//              `/chat/completions` endpoints with a per-call timeout.
//
// Gateways are values, passed into the pipeline explicitly. There is no
// process-wide provider registry, so parallel runs may use different
// gateways and tests can substitute trivial doubles.

pub mod http;

pub use http::HttpGateway;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default timeout for a single gateway call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a gateway call produced no usable text.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No provider is configured (offline mode, missing API key).
    #[error("no LLM provider configured")]
    NotConfigured,

    /// The provider did not answer within the requested timeout.
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS, or protocol failure.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success HTTP status.
    #[error("LLM provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider answered, but the payload had no text content.
    #[error("LLM response was empty or malformed: {0}")]
    BadResponse(String),

    /// The gateway was constructed with invalid settings.
    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),
}

/// A synchronous, timeout-bounded text completion service.
///
/// Implementations must be `Send + Sync`: one gateway value may serve many
/// concurrent pipeline runs.
pub trait LlmGateway: Send + Sync {
    /// Send one system + user prompt pair and return the raw reply text.
    fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError>;

    /// Short human-readable name for logs.
    fn name(&self) -> &str {
        "llm"
    }
}

impl<T: LlmGateway + ?Sized> LlmGateway for Arc<T> {
    fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        (**self).call(system_prompt, user_prompt, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: LlmGateway + ?Sized> LlmGateway for Box<T> {
    fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        (**self).call(system_prompt, user_prompt, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A gateway with no provider behind it. Every call fails with
/// `LlmError::NotConfigured`, which sends the caller down its deterministic
/// fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGateway;

impl LlmGateway for OfflineGateway {
    fn call(&self, _system: &str, _user: &str, _timeout: Duration) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Extract the payload from a reply that may wrap JSON in a Markdown code
/// fence (```` ```json ... ``` ````). Text without a fence is returned trimmed.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip an optional language tag on the fence line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_gateway_is_never_available() {
        let gateway = OfflineGateway;
        let err = gateway.call("sys", "user", DEFAULT_TIMEOUT).unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
        assert_eq!(gateway.name(), "offline");
    }

    #[test]
    fn shared_gateway_delegates() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(OfflineGateway);
        assert!(gateway.call("s", "u", DEFAULT_TIMEOUT).is_err());
        assert_eq!(gateway.name(), "offline");
    }

    #[test]
    fn strip_fenced_json() {
        let reply = "Here you go:\n```json\n{\"genre\": \"jazz\"}\n```\nEnjoy!";
        assert_eq!(strip_code_fences(reply), "{\"genre\": \"jazz\"}");
    }

    #[test]
    fn strip_bare_fence_without_language() {
        let reply = "```\n{\"tempo\": 90}\n```";
        assert_eq!(strip_code_fences(reply), "{\"tempo\": 90}");
    }

    #[test]
    fn strip_unfenced_reply_is_trimmed() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn strip_unterminated_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn error_messages_are_readable() {
        let err = LlmError::Status {
            status: 429,
            body: "rate limited".into(),
        };
        assert_eq!(err.to_string(), "LLM provider returned status 429: rate limited");
    }
}
