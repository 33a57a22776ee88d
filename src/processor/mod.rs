//! Processing pipeline - cached, retried, failure-isolated production.
//!
//! # Key Concepts
//! - ResultCache: one JSON file per item, keyed by the item's base name
//! - RetryingInvoker: bounded attempts with a fixed pause, retryable vs fatal
//! - ErrorLog: append-only, timestamped failure ledger
//! - BatchProcessor: walks the input in order and never lets one item abort the run

mod batch;
mod cache;
mod error;
mod error_log;
mod retry;

pub use batch::{BatchProcessor, BatchReport, ProcessingOutcome, ProcessingResult};
pub use cache::ResultCache;
pub use error::{CacheError, ProcessError, ProducerError};
pub use error_log::{ErrorLog, ErrorLogRecord, FailureKind};
pub use retry::{RetryPolicy, RetryingInvoker, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// JSON object produced for an item and persisted in the cache.
pub type Payload = serde_json::Map<String, serde_json::Value>;
