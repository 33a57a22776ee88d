//! Keyword cleaning against a controlled vocabulary.
//!
//! The vocabulary is loaded once by whoever owns it and passed in as a
//! dependency; nothing here caches globally.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::processor::Payload;

/// Maximum number of unique keywords considered per item.
pub const DEFAULT_KEYWORD_LIMIT: usize = 50;

pub const VALID_KEYWORDS_FIELD: &str = "Valid Keywords";
pub const REVIEW_KEYWORDS_FIELD: &str = "Review Keywords";

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("controlled vocabulary not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read vocabulary {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Cleaned keywords split by vocabulary membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordProcessingResult {
    pub valid: Vec<String>,
    pub review: Vec<String>,
}

impl KeywordProcessingResult {
    /// `(valid, review)` joined with `delimiter`.
    pub fn as_strings(&self, delimiter: &str) -> (String, String) {
        (self.valid.join(delimiter), self.review.join(delimiter))
    }
}

/// Set of accepted keywords, lower-cased.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    terms: HashSet<String>,
}

impl Vocabulary {
    /// Load one keyword per line, skipping blank lines and `#` comments.
    pub async fn load(path: &Path) -> Result<Self, VocabularyError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VocabularyError::NotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(VocabularyError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let vocabulary = Self::parse(&content);
        tracing::debug!(
            "Loaded {} vocabulary term(s) from {}",
            vocabulary.len(),
            path.display()
        );
        Ok(vocabulary)
    }

    pub fn parse(content: &str) -> Self {
        let terms = content
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        Self { terms }
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.terms.contains(keyword)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Normalise, de-duplicate, truncate to `limit`, then partition.
    pub fn clean_keywords(&self, raw: &Value, limit: usize) -> KeywordProcessingResult {
        let mut result = KeywordProcessingResult::default();
        for keyword in dedupe_keywords(raw, limit) {
            if self.contains(&keyword) {
                result.valid.push(keyword);
            } else {
                result.review.push(keyword);
            }
        }
        result
    }
}

fn split_keyword_string(raw: &str) -> impl Iterator<Item = &str> {
    raw.split([';', ',', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Flatten a raw keyword value into trimmed strings.
///
/// Strings are split on `;`, `,` and `|`. Array items are stringified
/// as-is; nulls are dropped.
pub fn normalise_keywords(raw: &Value) -> Vec<String> {
    match raw {
        Value::Null => Vec::new(),
        Value::String(s) => split_keyword_string(s).map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::String(s) => Some(s.trim().to_string()),
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Lower-cased, order-preserving unique keywords, at most `limit`.
pub fn dedupe_keywords(raw: &Value, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cleaned = Vec::new();
    for keyword in normalise_keywords(raw) {
        if cleaned.len() >= limit {
            break;
        }
        let lowered = keyword.to_lowercase();
        if seen.insert(lowered.clone()) {
            cleaned.push(lowered);
        }
    }
    cleaned
}

/// Copy `rows`, adding joined valid/review keyword columns derived from
/// `keywords_field`. The input rows are left untouched.
pub fn append_keyword_columns(
    rows: &[Payload],
    keywords_field: &str,
    vocabulary: &Vocabulary,
    delimiter: &str,
) -> Vec<Payload> {
    rows.iter()
        .map(|row| {
            let raw = row.get(keywords_field).unwrap_or(&Value::Null);
            let (valid, review) = vocabulary
                .clean_keywords(raw, DEFAULT_KEYWORD_LIMIT)
                .as_strings(delimiter);
            let mut out = row.clone();
            out.insert(VALID_KEYWORDS_FIELD.to_string(), Value::String(valid));
            out.insert(REVIEW_KEYWORDS_FIELD.to_string(), Value::String(review));
            out
        })
        .collect()
}
