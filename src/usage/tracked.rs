//! LLM client wrapper that records usage for every call.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use super::tracker::{CallRecord, UsageError, UsageTracker};
use crate::llm::{ChatMessage, ChatOptions, ChatResponse, LlmClient, LlmError};
use crate::processor::ProducerError;

/// Tracker shared between the tracked client and whoever reports on it.
pub type SharedTracker = Arc<Mutex<UsageTracker>>;

#[derive(Debug, Error)]
pub enum TrackedError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl From<TrackedError> for ProducerError {
    fn from(err: TrackedError) -> Self {
        match err {
            TrackedError::Llm(e) => e.into(),
            TrackedError::Usage(e) => ProducerError::Fatal(e.to_string()),
        }
    }
}

/// Brackets each outbound call with `start_call` / `finish_call`.
///
/// A failed call is still finished (with empty output) so no pending entry
/// is left behind.
pub struct TrackedClient {
    inner: Arc<dyn LlmClient>,
    tracker: SharedTracker,
}

impl TrackedClient {
    pub fn new(inner: Arc<dyn LlmClient>, tracker: SharedTracker) -> Self {
        Self { inner, tracker }
    }

    pub fn tracker(&self) -> &SharedTracker {
        &self.tracker
    }

    fn lock(&self) -> MutexGuard<'_, UsageTracker> {
        self.tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send `messages` for `item` and return the response with its usage record.
    pub async fn complete(
        &self,
        item: &str,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<(ChatResponse, CallRecord), TrackedError> {
        let prompt_text = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let call_id = self.lock().start_call(item, &prompt_text, Some(model));

        match self.inner.chat_completion(model, messages, options).await {
            Ok(response) => {
                let record = self.lock().finish_call(
                    call_id,
                    &response.content,
                    Some(model),
                    response.usage.as_ref(),
                )?;
                Ok((response, record))
            }
            Err(err) => {
                if let Err(e) = self.lock().finish_call(call_id, "", Some(model), None) {
                    tracing::error!("Failed to close usage record for '{}': {}", item, e);
                }
                Err(err.into())
            }
        }
    }
}
