//! FireKey: cached, retrying metadata generation for media files.
//!
//! Each input item is turned into a JSON payload by a [`producer::Producer`].
//! The [`processor::BatchProcessor`] stores payloads in a persistent cache
//! keyed by file name, retries transient failures with a fixed pause,
//! and records every failure in a durable plain-text error log. LLM calls are
//! accounted for by the [`usage::UsageTracker`]. Saved [`profiles`] add
//! operator context to every prompt.

pub mod cli;
pub mod config;
pub mod keywords;
pub mod llm;
pub mod processor;
pub mod producer;
pub mod profiles;
pub mod usage;
