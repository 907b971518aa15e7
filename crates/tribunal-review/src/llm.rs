//! Minimal client for the chat-completions API the specialists call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tribunal_core::{LlmConfig, TribunalError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// One turn of a specialist prompt.
///
/// # Examples
///
/// ```
/// use tribunal_review::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Assess this snippet");
/// assert_eq!(msg.role, Role::User);
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Speaker of a [`ChatMessage`], serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// HTTP client for the security and logic specialists.
///
/// Any server speaking the OpenAI `/v1/chat/completions` dialect will do;
/// a local Ollama or vLLM is configured through `base_url`. Each call is
/// bounded by `timeout_secs` so a hung provider surfaces as an error the
/// pattern fallback can absorb.
///
/// # Examples
///
/// ```
/// use tribunal_core::LlmConfig;
/// use tribunal_review::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o-mini");
/// assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// # Errors
    ///
    /// Returns [`TribunalError::Llm`] if reqwest cannot build its client.
    pub fn new(config: &LlmConfig) -> Result<Self, TribunalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| TribunalError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Completions URL, tolerating a trailing slash on `base_url`.
    pub fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1/chat/completions")
    }

    fn body(&self, messages: &[ChatMessage]) -> Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": 0.1,
            "response_format": { "type": "json_object" },
        })
    }

    /// Run one completion and return the assistant's raw text.
    ///
    /// Specialists ask for a JSON object at low temperature; parsing the
    /// text is left to [`crate::prompt`].
    ///
    /// # Errors
    ///
    /// Returns [`TribunalError::Llm`] when the request cannot be sent, the
    /// provider answers 429 (reported as an exhausted quota) or any other
    /// non-2xx status, or the body has no `choices[0].message.content`.
    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, TribunalError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .json(&self.body(&messages))
            .send()
            .await
            .map_err(|e| TribunalError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TribunalError::Llm(format!(
                "quota exhausted for model {}",
                self.config.model
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TribunalError::Llm(format!("provider returned {status}: {detail}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TribunalError::Llm(format!("response is not JSON: {e}")))?;
        first_choice(&payload)
    }
}

/// Text of the first choice in a completions payload.
fn first_choice(payload: &Value) -> Result<String, TribunalError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TribunalError::Llm(format!("no message content in response: {payload}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: Option<&str>) -> LlmClient {
        let config = LlmConfig {
            base_url: base_url.map(str::to_string),
            model: "llama3".into(),
            ..LlmConfig::default()
        };
        LlmClient::new(&config).unwrap()
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            client(Some("http://localhost:11434/")).endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(client(None).model(), "llama3");
    }

    #[test]
    fn body_requests_json_at_low_temperature() {
        let body = client(None).body(&[ChatMessage::system("rules"), ChatMessage::user("code")]);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "code");
    }

    #[test]
    fn first_choice_reads_message_content() {
        let payload = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "{\"findings\": []}" } }]
        });
        assert_eq!(first_choice(&payload).unwrap(), "{\"findings\": []}");

        let err = first_choice(&serde_json::json!({ "choices": [] })).unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_llm_error() {
        let config = LlmConfig {
            base_url: Some("http://127.0.0.1:9".into()),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let err = LlmClient::new(&config)
            .unwrap()
            .chat(vec![ChatMessage::user("ping")])
            .await
            .unwrap_err();
        assert!(matches!(err, TribunalError::Llm(_)));
    }
}
