//! Failure taxonomy for the processing pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failure raised by a [`Producer`](crate::producer::Producer).
///
/// `Network` and `Api` are presumed transient and are retried by the
/// [`RetryingInvoker`](super::RetryingInvoker). Everything else is `Fatal`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProducerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("{0}")]
    Fatal(String),
}

impl ProducerError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api(_))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

impl From<std::io::Error> for ProducerError {
    fn from(err: std::io::Error) -> Self {
        Self::Fatal(err.to_string())
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Fatal(format!("malformed producer output: {}", err))
    }
}

/// Errors reading or writing the result cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry '{key}' is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache entry '{key}' is not a JSON object")]
    NotAnObject { key: String },
}

/// Processing-level error for a single item.
///
/// None of these abort a batch; the [`BatchProcessor`](super::BatchProcessor)
/// logs them and moves on to the next item.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("input '{}' does not exist", .0.display())]
    MissingInput(PathBuf),

    #[error("'{item}' failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        item: String,
        attempts: u32,
        #[source]
        source: ProducerError,
    },

    #[error("unrecoverable error for '{item}': {message}")]
    Fatal { item: String, message: String },

    #[error("processing cancelled")]
    Cancelled,

    #[error(transparent)]
    Cache(#[from] CacheError),
}
