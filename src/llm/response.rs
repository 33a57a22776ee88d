//! Provider response shapes.
//!
//! Different endpoints (and SDK generations) return completions in different
//! envelopes. Each known envelope is its own variant with an explicit
//! extraction path; anything else is kept as `Unrecognized` so callers see
//! the failure instead of an empty string.

use serde_json::Value;

use super::TokenUsage;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// `{"choices": [{"message": {"content": ...}}]}` or legacy `{"choices": [{"text": ...}]}`.
    ChatCompletion { text: String, usage: Option<TokenUsage> },
    /// `{"output": [{"content": [{"text": ...}]}]}` from the Responses API.
    Responses { text: String, usage: Option<TokenUsage> },
    /// `{"message": {"content": ...}}`.
    Message { text: String, usage: Option<TokenUsage> },
    /// A bare JSON string.
    Text(String),
    /// Nothing we know how to read.
    Unrecognized(Value),
}

fn extract_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    let count = |key: &str| usage.get(key).and_then(Value::as_u64);
    // The Responses API names these input/output tokens.
    let parsed = TokenUsage {
        prompt_tokens: count("prompt_tokens").or_else(|| count("input_tokens")),
        completion_tokens: count("completion_tokens").or_else(|| count("output_tokens")),
        total_tokens: count("total_tokens"),
    };
    (!parsed.is_empty()).then_some(parsed)
}

fn chat_completion_text(value: &Value) -> Option<String> {
    let first = value.get("choices")?.as_array()?.first()?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| first.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

fn responses_text(value: &Value) -> Option<String> {
    value
        .get("output")?
        .as_array()?
        .first()?
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
        .map(str::to_string)
}

fn message_text(value: &Value) -> Option<String> {
    value
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

impl ProviderResponse {
    /// Classify a raw response body.
    pub fn from_value(value: Value) -> Self {
        if let Value::String(text) = value {
            return Self::Text(text);
        }
        let usage = extract_usage(&value);
        if let Some(text) = chat_completion_text(&value) {
            return Self::ChatCompletion { text, usage };
        }
        if let Some(text) = responses_text(&value) {
            return Self::Responses { text, usage };
        }
        if let Some(text) = message_text(&value) {
            return Self::Message { text, usage };
        }
        Self::Unrecognized(value)
    }

    /// Completion text, or `None` for an unrecognized shape.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::ChatCompletion { text, .. }
            | Self::Responses { text, .. }
            | Self::Message { text, .. }
            | Self::Text(text) => Some(text),
            Self::Unrecognized(_) => None,
        }
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Self::ChatCompletion { usage, .. }
            | Self::Responses { usage, .. }
            | Self::Message { usage, .. } => usage.as_ref(),
            Self::Text(_) | Self::Unrecognized(_) => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}
