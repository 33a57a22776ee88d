//! Producers turn one input item into a JSON payload.
//!
//! A producer is the expensive, fallible external call the pipeline guards:
//! the batch processor caches its output and the retrying invoker decides
//! what to do with its failures.

mod metadata;
mod prompt;
mod stat;

pub use metadata::MetadataProducer;
pub use prompt::{PromptError, PromptRepository, PromptTemplate};
pub use stat::StatProducer;

use std::path::Path;

use async_trait::async_trait;

use crate::processor::{Payload, ProducerError};

/// Trait for payload producers.
///
/// # Contract
/// - Return `ProducerError::Network` / `ProducerError::Api` for failures that
///   may succeed on another attempt.
/// - Return `ProducerError::Fatal` for anything else; it is not retried.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Produce the payload for `item`.
    async fn produce(&self, item: &Path) -> Result<Payload, ProducerError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "producer"
    }
}
