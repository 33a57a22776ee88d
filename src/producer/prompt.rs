//! Prompt templates with `{type}` / `{context}` placeholders, and a
//! directory of them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read prompt template {}: {source}", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid prompt template {}: {source}", .path.display())]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a stock media librarian. You write accurate, \
searchable metadata for {type} files. Respond only with JSON.";

const DEFAULT_USER_PROMPT: &str = r#"Write metadata for the following {type}.

{context}

Respond with a JSON object:
{{"title": "short title", "description": "one or two sentences", "keywords": ["up to 50 single-concept keywords"]}}"#;

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

/// Substitute `{name}` placeholders from `values`.
///
/// `{{` and `}}` are literal braces. Unknown placeholders are kept verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        match tail.find('}') {
            Some(end) => {
                let key = &tail[1..end];
                match values.iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl PromptTemplate {
    /// Load a JSON template with `name`, `system_prompt` and `user_prompt`.
    pub async fn load(path: &Path) -> Result<Self, PromptError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PromptError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| PromptError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Rendered `(system, user)` prompts.
    pub fn render(&self, type_value: &str, context: &str) -> (String, String) {
        let values = [("type", type_value), ("context", context)];
        (
            render(&self.system_prompt, &values),
            render(&self.user_prompt, &values),
        )
    }
}

/// Templates found in a prompts directory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct PromptRepository {
    templates: BTreeMap<String, PromptTemplate>,
}

impl PromptRepository {
    /// Load every `*.txt` template in `dir`. Invalid files are skipped and a
    /// missing directory yields an empty repository.
    pub async fn load(dir: &Path) -> Result<Self, PromptError> {
        let io_err = |source| PromptError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut templates = BTreeMap::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_err(e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            match PromptTemplate::load(&path).await {
                Ok(template) => {
                    templates.insert(file_name, template);
                }
                Err(e) => tracing::warn!("Skipping prompt template: {}", e),
            }
        }
        tracing::debug!("Loaded {} prompt template(s) from {}", templates.len(), dir.display());
        Ok(Self { templates })
    }

    pub fn get(&self, file_name: &str) -> Option<&PromptTemplate> {
        self.templates.get(file_name)
    }

    /// `(file name, template)` pairs ordered by file name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PromptTemplate)> {
        self.templates.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
