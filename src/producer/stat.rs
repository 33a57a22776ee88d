//! Offline producer that mirrors basic file metadata.

use std::path::Path;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Producer;
use crate::processor::{Payload, ProducerError};

const PREVIEW_CHARS: usize = 200;
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "json"];

/// Deterministic producer needing no network: size, mtime, and a short
/// preview for text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatProducer;

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

/// First `PREVIEW_CHARS` characters of a text file, `None` for other files
/// or empty content.
pub(crate) async fn text_preview(path: &Path) -> Result<Option<String>, ProducerError> {
    if !is_text_file(path) {
        return Ok(None);
    }
    let bytes = tokio::fs::read(path).await?;
    let content = String::from_utf8(bytes)
        .map_err(|e| ProducerError::fatal(format!("'{}' is not UTF-8: {}", path.display(), e)))?;
    if content.is_empty() {
        return Ok(None);
    }
    Ok(Some(content.chars().take(PREVIEW_CHARS).collect()))
}

#[async_trait]
impl Producer for StatProducer {
    async fn produce(&self, item: &Path) -> Result<Payload, ProducerError> {
        let meta = tokio::fs::metadata(item).await?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64());
        let preview = text_preview(item).await?;

        let file_name = item
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let payload = json!({
            "file_name": file_name,
            "size_bytes": meta.len(),
            "modified": modified,
            "content_preview": preview,
        });
        match payload {
            Value::Object(map) => Ok(map),
            _ => Err(ProducerError::fatal("stat payload is not an object")),
        }
    }

    fn name(&self) -> &str {
        "stat"
    }
}
