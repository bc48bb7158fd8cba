// Blocking HTTP gateway for OpenAI-compatible chat completion endpoints.
//
// Most hosted providers (and local servers such as Ollama or llama.cpp's
// server) expose `POST {base}/chat/completions` with the same request and
// response shape, so one client covers them. The call is synchronous and
// every request carries the caller's timeout; a timeout maps to
// `LlmError::Timeout` so the intent extractor can fall back immediately.

use crate::{LlmError, LlmGateway};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling temperature for extraction prompts. Low, for stable JSON.
const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Upper bound on reply length; an intent object is well under this.
const MAX_REPLY_TOKENS: u32 = 400;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Gateway to an OpenAI-compatible HTTP endpoint.
pub struct HttpGateway {
    client: reqwest::blocking::Client,
    completions_url: Url,
    model: String,
    api_key: Option<String>,
}

impl HttpGateway {
    /// Build a gateway for `base_url` (e.g. `https://api.groq.com/openai/v1`).
    ///
    /// The URL is validated here; no network traffic happens until `call`.
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self, LlmError> {
        if model.trim().is_empty() {
            return Err(LlmError::InvalidConfig("model name is empty".into()));
        }
        let mut base = Url::parse(base_url)
            .map_err(|e| LlmError::InvalidConfig(format!("bad endpoint '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let completions_url = base
            .join("chat/completions")
            .map_err(|e| LlmError::InvalidConfig(e.to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            completions_url,
            model: model.to_string(),
            api_key,
        })
    }

    /// The fully resolved completions URL.
    pub fn completions_url(&self) -> &Url {
        &self.completions_url
    }
}

impl LlmGateway for HttpGateway {
    fn call(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: EXTRACTION_TEMPERATURE,
            max_tokens: MAX_REPLY_TOKENS,
        };

        let mut request = self
            .client
            .post(self.completions_url.clone())
            .timeout(timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(url = %self.completions_url, model = %self.model, "sending LLM request");
        let response = request.send().map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let text = response.text().map_err(|e| classify(e, timeout))?;
        parse_chat_response(&text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(timeout)
    } else {
        LlmError::Transport(error.to_string())
    }
}

/// Pull the first choice's message text out of a chat completion body.
fn parse_chat_response(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::BadResponse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmError::BadResponse("no message content in first choice".into()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completions_url_appends_path() {
        let gw = HttpGateway::new("http://localhost:11434/v1", "llama3", None).unwrap();
        assert_eq!(
            gw.completions_url().as_str(),
            "http://localhost:11434/v1/chat/completions"
        );

        let gw = HttpGateway::new("http://localhost:8080/", "m", None).unwrap();
        assert_eq!(gw.completions_url().as_str(), "http://localhost:8080/chat/completions");
    }

    #[test]
    fn rejects_bad_endpoint_and_empty_model() {
        assert!(matches!(
            HttpGateway::new("not a url", "m", None),
            Err(LlmError::InvalidConfig(_))
        ));
        assert!(matches!(
            HttpGateway::new("http://localhost", "  ", None),
            Err(LlmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "S",
                },
                ChatMessage {
                    role: "user",
                    content: "U",
                },
            ],
            temperature: 0.5,
            max_tokens: 10,
        };
        let json: serde_json::Value = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "U");
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn parses_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"genre\":\"jazz\"}"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "{\"genre\":\"jazz\"}");
    }

    #[test]
    fn empty_choices_is_bad_response() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(LlmError::BadResponse(_))
        ));
        assert!(matches!(
            parse_chat_response(r#"{"choices":[{"message":{"content":"   "}}]}"#),
            Err(LlmError::BadResponse(_))
        ));
        assert!(matches!(parse_chat_response("<html>"), Err(LlmError::BadResponse(_))));
    }
}
