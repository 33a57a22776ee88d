//! Token and cost accounting for outbound model calls.
//!
//! Every call moves through `none -> pending -> finished`: [`UsageTracker::start_call`]
//! registers a [`PendingCall`] and hands back a [`CallId`];
//! [`UsageTracker::finish_call`] consumes that id exactly once and appends an
//! immutable [`CallRecord`].

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::pricing::PricingTable;
use crate::llm::TokenUsage;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Opaque handle correlating a `start_call` with its `finish_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// The id was never issued, or its call has already been finished.
    #[error("no pending call with id {0}")]
    UnknownCall(CallId),
}

/// A call that has started but not finished.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub id: CallId,
    pub item: String,
    pub model: String,
    pub estimated_prompt_tokens: u64,
}

/// Accounting entry for one finished call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub file_name: String,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

/// Rough token count: one token per four characters, at least one for
/// non-empty text.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    if chars == 0 {
        return 0;
    }
    ((chars + 3) / 4).max(1)
}

/// Run-scoped ledger of calls, tokens, and estimated cost.
pub struct UsageTracker {
    pricing: PricingTable,
    default_model: String,
    pending: HashMap<CallId, PendingCall>,
    records: Vec<CallRecord>,
    total_tokens: u64,
    total_cost: f64,
    /// Echo each record and summary to stdout for the operator.
    echo: bool,
}

impl UsageTracker {
    pub fn new(pricing: PricingTable, default_model: impl Into<String>) -> Self {
        Self {
            pricing,
            default_model: default_model.into(),
            pending: HashMap::new(),
            records: Vec::new(),
            total_tokens: 0,
            total_cost: 0.0,
            echo: true,
        }
    }

    /// Disable or enable the stdout echo.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn records(&self) -> &[CallRecord] {
        &self.records
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Calls started but not yet finished.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Register the start of a call and return its correlation id.
    pub fn start_call(&mut self, item: &str, input_text: &str, model: Option<&str>) -> CallId {
        let id = CallId(Uuid::new_v4());
        let pending = PendingCall {
            id,
            item: item.to_string(),
            model: model.unwrap_or(self.default_model.as_str()).to_string(),
            estimated_prompt_tokens: estimate_tokens(input_text),
        };
        self.pending.insert(id, pending);
        id
    }

    /// Finish a pending call and append its record.
    ///
    /// Supplied `usage` wins over the character heuristic. When only
    /// `total_tokens` is reported, or completion is reported as zero next to
    /// a larger total, completion tokens are inferred as `total - prompt`
    /// (floored at zero).
    pub fn finish_call(
        &mut self,
        id: CallId,
        output_text: &str,
        model: Option<&str>,
        usage: Option<&TokenUsage>,
    ) -> Result<CallRecord, UsageError> {
        let pending = self.pending.remove(&id).ok_or(UsageError::UnknownCall(id))?;
        let model = model
            .map(str::to_string)
            .unwrap_or(pending.model);

        let (prompt_tokens, completion_tokens, total_tokens) = match usage.filter(|u| !u.is_empty()) {
            Some(usage) => {
                let prompt = usage.prompt_tokens.unwrap_or(pending.estimated_prompt_tokens);
                // A zero completion next to a larger total is a placeholder.
                let completion = match (usage.completion_tokens, usage.total_tokens) {
                    (Some(0), Some(total)) if total > prompt => None,
                    (completion, _) => completion,
                };
                match (completion, usage.total_tokens) {
                    (Some(completion), Some(total)) => (prompt, completion, total),
                    (Some(completion), None) => (prompt, completion, prompt + completion),
                    (None, Some(total)) => (prompt, total.saturating_sub(prompt), total),
                    (None, None) => {
                        let completion = estimate_tokens(output_text);
                        (prompt, completion, prompt + completion)
                    }
                }
            }
            None => {
                let prompt = pending.estimated_prompt_tokens;
                let completion = estimate_tokens(output_text);
                (prompt, completion, prompt + completion)
            }
        };

        let cost = self
            .pricing
            .get(&model)
            .cost_for(prompt_tokens, completion_tokens);

        self.total_tokens += total_tokens;
        self.total_cost += cost;

        let record = CallRecord {
            file_name: pending.item,
            model,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            cost,
        };
        self.records.push(record.clone());

        tracing::debug!(
            "Call {} for '{}' used {} tokens (${:.6})",
            id,
            record.file_name,
            record.total_tokens,
            record.cost
        );
        if self.echo {
            println!(
                "[{}] Tokens used: {} | Approx Cost: ${:.6} | Model: {}",
                record.file_name, record.total_tokens, record.cost, record.model
            );
        }

        Ok(record)
    }

    /// `Total tokens: N | Estimated cost: $C`
    pub fn format_summary(&self) -> String {
        format!(
            "Total tokens: {} | Estimated cost: ${:.6}",
            self.total_tokens, self.total_cost
        )
    }

    pub fn print_summary(&self) {
        if self.echo {
            println!("{}", self.format_summary());
        }
        tracing::info!("{}", self.format_summary());
    }

    /// Summary as a CSV comment line.
    pub fn csv_footer_comment(&self) -> String {
        format!("# {}", self.format_summary())
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(PricingTable::default(), DEFAULT_MODEL)
    }
}
