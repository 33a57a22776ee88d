//! Durable, append-only failure ledger.
//!
//! Each failure becomes one `[YYYY-MM-DD HH:MM:SS] <message>` line. The file
//! is opened in append mode for every write so it survives restarts and is
//! never truncated.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What went wrong for an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The source item does not exist.
    MissingInput,
    /// A retryable attempt failed.
    Attempt(u32),
    /// A non-retryable failure; no further attempts are made.
    Unrecoverable,
    /// The result was produced but could not be written to the cache.
    CacheWrite,
}

/// One line of the error log.
#[derive(Debug, Clone)]
pub struct ErrorLogRecord {
    pub timestamp: DateTime<Local>,
    pub item: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ErrorLogRecord {
    pub fn new(item: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            item: item.into(),
            kind,
            message: message.into(),
        }
    }

    /// Attempt number, when the record describes a retryable attempt.
    pub fn attempt(&self) -> Option<u32> {
        match self.kind {
            FailureKind::Attempt(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ", self.timestamp.format(TIMESTAMP_FORMAT))?;
        match &self.kind {
            FailureKind::MissingInput => {
                write!(f, "File '{}' does not exist; skipping processing.", self.item)
            }
            FailureKind::Attempt(n) => {
                write!(f, "Attempt {} for '{}' failed: {}", n, self.item, self.message)
            }
            FailureKind::Unrecoverable => {
                write!(f, "Unrecoverable error for '{}': {}", self.item, self.message)
            }
            FailureKind::CacheWrite => write!(
                f,
                "Failed to cache result for '{}': {}",
                self.item, self.message
            ),
        }
    }
}

/// Append-only error log shared by every component of a run.
pub struct ErrorLog {
    path: PathBuf,
    // Serializes appends so concurrent writers never interleave lines.
    write_lock: Mutex<()>,
}

impl ErrorLog {
    /// Create a log writing to `path`. Parent directories are created lazily.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure record.
    pub async fn append(
        &self,
        item: &str,
        kind: FailureKind,
        message: &str,
    ) -> std::io::Result<()> {
        self.append_record(&ErrorLogRecord::new(item, kind, message))
            .await
    }

    pub async fn append_record(&self, record: &ErrorLogRecord) -> std::io::Result<()> {
        let line = format!("{}\n", record);

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Append, reporting (but swallowing) a failure to write the log itself.
    pub(crate) async fn record(&self, item: &str, kind: FailureKind, message: &str) {
        if let Err(e) = self.append(item, kind, message).await {
            tracing::error!(
                "Failed to write error log {}: {} (item '{}')",
                self.path.display(),
                e,
                item
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_formats() {
        let attempt = ErrorLogRecord::new("a.jpg", FailureKind::Attempt(2), "timeout");
        let line = attempt.to_string();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] Attempt 2 for 'a.jpg' failed: timeout"));
        assert_eq!(attempt.attempt(), Some(2));

        let fatal = ErrorLogRecord::new("a.jpg", FailureKind::Unrecoverable, "bad json");
        assert!(fatal
            .to_string()
            .ends_with("Unrecoverable error for 'a.jpg': bad json"));
        assert_eq!(fatal.attempt(), None);

        let missing = ErrorLogRecord::new("/tmp/nope.mov", FailureKind::MissingInput, "");
        assert!(missing
            .to_string()
            .ends_with("File '/tmp/nope.mov' does not exist; skipping processing."));
    }

    #[test]
    fn test_timestamp_shape() {
        let line = ErrorLogRecord::new("a", FailureKind::Unrecoverable, "x").to_string();
        // [YYYY-MM-DD HH:MM:SS]
        assert_eq!(&line[20..21], "]");
        assert_eq!(&line[5..6], "-");
        assert_eq!(&line[11..12], " ");
    }

    #[tokio::test]
    async fn test_appends_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/nested/errors.txt");

        ErrorLog::new(&path)
            .append("a.txt", FailureKind::Attempt(1), "first")
            .await
            .unwrap();
        ErrorLog::new(&path)
            .append("a.txt", FailureKind::Attempt(2), "second")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Attempt 1"));
        assert!(lines[1].contains("Attempt 2"));
    }
}
