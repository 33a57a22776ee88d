//! LLM error classification.

use std::fmt;

use thiserror::Error;

use crate::processor::ProducerError;

/// Broad category of an LLM call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Connection, DNS, or timeout before a response arrived.
    Network,
    /// HTTP 429 or 408.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// Any other 4xx (bad request, auth, unknown model).
    ClientError,
    /// A 2xx whose body we could not interpret.
    InvalidResponse,
}

impl LlmErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::ServerError)
    }
}

impl fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::ClientError => "client error",
            Self::InvalidResponse => "invalid response",
        };
        f.write_str(s)
    }
}

/// Classify a non-success HTTP status.
pub fn classify_http_status(status: u16) -> LlmErrorKind {
    match status {
        408 | 429 => LlmErrorKind::RateLimited,
        500..=599 => LlmErrorKind::ServerError,
        _ => LlmErrorKind::ClientError,
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: classify_http_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::new(LlmErrorKind::InvalidResponse, err.to_string()),
            None => Self::new(LlmErrorKind::Network, err.to_string()),
        }
    }
}

impl From<LlmError> for ProducerError {
    fn from(err: LlmError) -> Self {
        match err.kind {
            LlmErrorKind::Network => ProducerError::Network(err.to_string()),
            LlmErrorKind::RateLimited | LlmErrorKind::ServerError => {
                ProducerError::Api(err.to_string())
            }
            LlmErrorKind::ClientError | LlmErrorKind::InvalidResponse => {
                ProducerError::Fatal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_http_status() {
        assert_eq!(classify_http_status(429), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(408), LlmErrorKind::RateLimited);
        assert_eq!(classify_http_status(502), LlmErrorKind::ServerError);
        assert_eq!(classify_http_status(401), LlmErrorKind::ClientError);
        assert_eq!(classify_http_status(404), LlmErrorKind::ClientError);
    }

    #[test]
    fn test_producer_error_mapping() {
        let retryable: ProducerError = LlmError::from_status(503, "unavailable").into();
        assert!(retryable.is_retryable());

        let fatal: ProducerError = LlmError::from_status(400, "bad request").into();
        assert!(!fatal.is_retryable());

        let network: ProducerError = LlmError::new(LlmErrorKind::Network, "reset").into();
        assert!(matches!(network, ProducerError::Network(_)));
    }

    #[test]
    fn test_display_includes_status() {
        let err = LlmError::from_status(429, "slow down");
        assert_eq!(err.to_string(), "rate limited (HTTP 429): slow down");
        let err = LlmError::new(LlmErrorKind::InvalidResponse, "empty");
        assert_eq!(err.to_string(), "invalid response: empty");
    }
}
