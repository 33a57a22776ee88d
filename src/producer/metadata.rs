//! LLM-backed producer that writes title, description and keywords for a file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::stat::text_preview;
use super::{PromptTemplate, Producer};
use crate::keywords::{dedupe_keywords, Vocabulary, DEFAULT_KEYWORD_LIMIT};
use crate::llm::{ChatMessage, ChatOptions};
use crate::processor::{Payload, ProducerError};
use crate::usage::TrackedClient;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "webp", "tif", "tiff"];
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

/// Shape the model is asked to answer with.
#[derive(Debug, Deserialize)]
struct GeneratedMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    keywords: Value,
}

fn media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        "image"
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        "video"
    } else {
        "file"
    }
}

/// Strip a surrounding ``` or ```json fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_generated(text: &str) -> Result<GeneratedMetadata, ProducerError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))?;
    if !value.is_object() {
        return Err(ProducerError::fatal(
            "malformed producer output: expected a JSON object",
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub struct MetadataProducer {
    client: TrackedClient,
    model: String,
    options: ChatOptions,
    template: PromptTemplate,
    vocabulary: Arc<Vocabulary>,
    operator_context: String,
}

impl MetadataProducer {
    pub fn new(client: TrackedClient, model: impl Into<String>, creativity: f64) -> Self {
        Self {
            client,
            model: model.into(),
            options: ChatOptions {
                temperature: Some(creativity),
                ..Default::default()
            },
            template: PromptTemplate::default(),
            vocabulary: Arc::new(Vocabulary::default()),
            operator_context: String::new(),
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Without a vocabulary every keyword lands in `review_keywords`.
    pub fn with_vocabulary(mut self, vocabulary: Arc<Vocabulary>) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    /// Operator text (profile plus `--context`) placed ahead of the file details.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.operator_context = context.into();
        self
    }

    async fn context_for(&self, item: &Path, file_name: &str) -> Result<String, ProducerError> {
        let meta = tokio::fs::metadata(item).await?;
        let mut context = String::new();
        let operator = self.operator_context.trim();
        if !operator.is_empty() {
            context.push_str(operator);
            context.push_str("\n\n");
        }
        context.push_str(&format!("File name: {}\nSize: {} bytes", file_name, meta.len()));
        if let Some(preview) = text_preview(item).await? {
            context.push_str("\nContent preview:\n");
            context.push_str(&preview);
        }
        Ok(context)
    }
}

#[async_trait]
impl Producer for MetadataProducer {
    async fn produce(&self, item: &Path) -> Result<Payload, ProducerError> {
        let file_name = item
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let context = self.context_for(item, &file_name).await?;
        let (system, user) = self.template.render(media_type(item), &context);
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];

        let (response, record) = self
            .client
            .complete(&file_name, &self.model, &messages, &self.options)
            .await?;
        tracing::debug!(
            "Metadata for '{}' used {} token(s)",
            file_name,
            record.total_tokens
        );

        let generated = parse_generated(&response.content)?;
        let keywords = dedupe_keywords(&generated.keywords, DEFAULT_KEYWORD_LIMIT);
        let cleaned = self
            .vocabulary
            .clean_keywords(&generated.keywords, DEFAULT_KEYWORD_LIMIT);

        let payload = json!({
            "file_name": file_name,
            "model": record.model,
            "title": generated.title.trim(),
            "description": generated.description.trim(),
            "keywords": keywords,
            "valid_keywords": cleaned.valid,
            "review_keywords": cleaned.review,
        });
        match payload {
            Value::Object(map) => Ok(map),
            _ => Err(ProducerError::fatal("metadata payload is not an object")),
        }
    }

    fn name(&self) -> &str {
        "metadata"
    }
}
