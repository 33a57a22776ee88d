//! Batch orchestration: cache lookup, retrying production, skip-on-failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::cache::ResultCache;
use super::error::{CacheError, ProcessError};
use super::error_log::{ErrorLog, FailureKind};
use super::retry::{RetryPolicy, RetryingInvoker};
use crate::producer::Producer;

/// How an item ended up in the result mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Served from (or freshly written to) the cache without a force request.
    Cached,
    /// Recomputed because a forced reprocess was requested.
    Reprocessed,
    /// The source item was missing. Never present in a [`BatchReport`].
    SkippedMissing,
    /// Production failed. Never present in a [`BatchReport`].
    SkippedFailed,
}

impl ProcessingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Reprocessed => "reprocessed",
            Self::SkippedMissing => "skipped-missing",
            Self::SkippedFailed => "skipped-failed",
        }
    }
}

impl std::fmt::Display for ProcessingOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for one successfully resolved item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub file_name: String,
    pub cache_path: PathBuf,
    pub outcome: ProcessingOutcome,
    /// Whether the producer ran for this item during the run.
    pub invoked: bool,
}

impl ProcessingResult {
    pub fn was_reprocessed(&self) -> bool {
        self.outcome == ProcessingOutcome::Reprocessed
    }
}

/// Ordered per-run report.
///
/// Only cached or (re)processed items appear in `results`. Missing and failed
/// items are counted but otherwise only visible through the error log.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    results: Vec<ProcessingResult>,
    pub skipped_missing: usize,
    pub skipped_failed: usize,
    pub cancelled: bool,
}

impl BatchReport {
    /// Insert a result, replacing an earlier entry with the same name in place.
    pub fn insert(&mut self, result: ProcessingResult) {
        match self
            .results
            .iter_mut()
            .find(|r| r.file_name == result.file_name)
        {
            Some(existing) => *existing = result,
            None => self.results.push(result),
        }
    }

    pub fn get(&self, file_name: &str) -> Option<&ProcessingResult> {
        self.results.iter().find(|r| r.file_name == file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.get(file_name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessingResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<ProcessingResult> {
        self.results
    }
}

/// Sequential batch processor with a persistent cache and durable error log.
///
/// # Invariants
/// - A single item's failure never aborts the batch.
/// - A cache hit without `force_reprocess` never invokes the producer.
/// - Nothing is written to the cache for an item whose production failed.
pub struct BatchProcessor {
    cache: ResultCache,
    log: Arc<ErrorLog>,
    invoker: RetryingInvoker,
    producer: Arc<dyn Producer>,
    cancel: Option<CancellationToken>,
}

impl BatchProcessor {
    /// Build a processor. Fails only if the cache directory cannot be created.
    pub async fn new(
        cache_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
        producer: Arc<dyn Producer>,
        policy: RetryPolicy,
    ) -> Result<Self, CacheError> {
        let cache = ResultCache::open(cache_dir).await?;
        let log = Arc::new(ErrorLog::new(log_path));
        if let Some(parent) = log.path().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| CacheError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
        }
        let invoker = RetryingInvoker::new(policy, Arc::clone(&log));
        tracing::debug!(
            "Batch processor using '{}' producer, cache at {}",
            producer.name(),
            cache.root().display()
        );
        Ok(Self {
            cache,
            log,
            invoker,
            producer,
            cancel: None,
        })
    }

    /// Stop between items (and during retry pauses) once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.invoker = self.invoker.with_cancellation(token.clone());
        self.cancel = Some(token);
        self
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.log
    }

    /// Process `items` in order.
    pub async fn process<P: AsRef<Path>>(&self, items: &[P], force_reprocess: bool) -> BatchReport {
        let mut report = BatchReport::default();

        for item in items {
            if self.is_cancelled() {
                tracing::warn!("Batch cancelled with {} item(s) resolved", report.len());
                report.cancelled = true;
                break;
            }

            match self.process_item(item.as_ref(), force_reprocess).await {
                Ok(result) => report.insert(result),
                Err(ProcessError::MissingInput(_)) => report.skipped_missing += 1,
                Err(ProcessError::Cancelled) => {
                    tracing::warn!("Batch cancelled while retrying '{}'", item.as_ref().display());
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    tracing::debug!("Skipping '{}': {}", item.as_ref().display(), e);
                    report.skipped_failed += 1;
                }
            }
        }

        tracing::info!(
            "Batch finished: {} resolved, {} missing, {} failed",
            report.len(),
            report.skipped_missing,
            report.skipped_failed
        );
        report
    }

    async fn process_item(
        &self,
        item: &Path,
        force_reprocess: bool,
    ) -> Result<ProcessingResult, ProcessError> {
        let exists = tokio::fs::try_exists(item).await.unwrap_or(false);
        let key = match ResultCache::key_for(item) {
            Some(key) if exists => key,
            _ => {
                let shown = item.display().to_string();
                self.log.record(&shown, FailureKind::MissingInput, "").await;
                tracing::warn!("Input '{}' does not exist, skipping", shown);
                return Err(ProcessError::MissingInput(item.to_path_buf()));
            }
        };

        if !force_reprocess && self.cache.exists(&key).await {
            tracing::debug!("Cache hit for '{}'", key);
            return Ok(ProcessingResult {
                cache_path: self.cache.path_for(&key),
                file_name: key,
                outcome: ProcessingOutcome::Cached,
                invoked: false,
            });
        }

        // Failures are logged by the invoker.
        let payload = self.invoker.invoke(self.producer.as_ref(), item).await?;

        let cache_path = match self.cache.store(&key, &payload).await {
            Ok(path) => path,
            Err(e) => {
                self.log
                    .record(&key, FailureKind::CacheWrite, &e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        Ok(ProcessingResult {
            file_name: key,
            cache_path,
            outcome: if force_reprocess {
                ProcessingOutcome::Reprocessed
            } else {
                ProcessingOutcome::Cached
            },
            invoked: true,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }
}
