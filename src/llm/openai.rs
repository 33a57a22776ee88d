//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, ChatOptions, ChatResponse, LlmClient, LlmError, LlmErrorKind, ProviderResponse};

pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for `POST {base_url}/chat/completions`.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_API_BASE_URL)
    }

    /// Point the client at another OpenAI-compatible endpoint.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, LlmError> {
        let mut body = json!({
            "model": model,
            "messages": messages,
        });
        if let Some(t) = options.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = options.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(m) = options.max_tokens {
            body["max_tokens"] = json!(m);
        }

        tracing::debug!("POST {} (model {})", self.endpoint(), model);
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), text));
        }

        let raw: serde_json::Value = response.json().await?;
        let returned_model = raw
            .get("model")
            .and_then(|m| m.as_str())
            .map(str::to_string);
        let finish_reason = raw
            .pointer("/choices/0/finish_reason")
            .and_then(|f| f.as_str())
            .map(str::to_string);

        let parsed = ProviderResponse::from_value(raw);
        let content = parsed
            .text()
            .map(str::to_string)
            .ok_or_else(|| LlmError::new(LlmErrorKind::InvalidResponse, "unrecognized response shape"))?;

        Ok(ChatResponse {
            content,
            finish_reason,
            usage: parsed.usage().cloned(),
            model: returned_model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn call(server: &MockServer) -> Result<ChatResponse, LlmError> {
        let client = OpenAiClient::with_base_url("test-key", format!("{}/v1/", server.uri()));
        client
            .chat_completion("gpt-4o-mini", &[ChatMessage::user("hi")], &ChatOptions::default())
            .await
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-mini-2024-07-18",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "{\"title\": \"x\"}"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            })))
            .mount(&server)
            .await;

        let resp = call(&server).await.unwrap();

        assert_eq!(resp.content, "{\"title\": \"x\"}");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.model.as_deref(), Some("gpt-4o-mini-2024-07-18"));
        assert_eq!(resp.usage.unwrap().total_tokens, Some(15));
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = call(&server).await.unwrap_err();

        assert_eq!(err.status, Some(502));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_auth_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = call(&server).await.unwrap_err();

        assert_eq!(err.kind, LlmErrorKind::ClientError);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unrecognized_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let err = call(&server).await.unwrap_err();
        assert_eq!(err.kind, LlmErrorKind::InvalidResponse);
    }
}
