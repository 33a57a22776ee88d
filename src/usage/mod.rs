//! Usage module - token accounting and model pricing.
//!
//! # Key Concepts
//! - UsageTracker: pending/finished call ledger with running totals
//! - Pricing: per-model cost table with a fallback tier
//! - TrackedClient: wraps an LLM client so every call is accounted for
//! - CSV: export of call records with a summary footer

mod csv;
mod pricing;
mod tracked;
mod tracker;

pub use csv::{render_usage_csv, write_usage_csv, CSV_HEADERS};
pub use pricing::{ModelPricing, PricingTable, DEFAULT_PRICING};
pub use tracked::{SharedTracker, TrackedClient, TrackedError};
pub use tracker::{
    estimate_tokens, CallId, CallRecord, PendingCall, UsageError, UsageTracker, DEFAULT_MODEL,
};
