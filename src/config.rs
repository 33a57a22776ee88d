//! JSON configuration file with defaults and environment overrides.
//!
//! The file is created with defaults on first use. Missing fields are filled
//! in and written back so the file on disk always shows every setting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::DEFAULT_API_BASE_URL;
use crate::processor::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};
use crate::usage::{ModelPricing, DEFAULT_MODEL};

pub const CONFIG_PATH_ENV: &str = "FIREKEY_CONFIG_PATH";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: String,
    pub default_model: String,
    /// Sampling temperature passed to the model.
    pub default_creativity: f64,
    pub api_base_url: String,
    pub cache_dir: PathBuf,
    pub log_path: PathBuf,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocabulary_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_path: Option<PathBuf>,
    /// Directory of `*.txt` prompt templates selectable by file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
    /// Directory of saved context profiles.
    pub profiles_dir: PathBuf,
    /// Per-model price overrides, merged over the built-in table.
    pub pricing: HashMap<String, ModelPricing>,
    /// Keys this version does not know, kept so a rewrite never drops them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            default_creativity: 0.4,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache_dir: PathBuf::from("cache"),
            log_path: PathBuf::from("logs/firekey-errors.txt"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            vocabulary_path: None,
            prompt_path: None,
            prompts_dir: None,
            profiles_dir: PathBuf::from("profiles"),
            pricing: HashMap::new(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// The configured key, falling back to `env_key` when the file's is blank.
    pub fn resolve_api_key(&self, env_key: Option<String>) -> Option<String> {
        let key = self.api_key.trim();
        if !key.is_empty() {
            return Some(key.to_string());
        }
        env_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// API key from the file or `OPENAI_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.resolve_api_key(std::env::var(API_KEY_ENV).ok())
    }

    /// Resolve relative paths against `base` (normally the config file's directory).
    pub fn with_base_dir(mut self, base: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.cache_dir);
        rebase(&mut self.log_path);
        rebase(&mut self.profiles_dir);
        for p in [
            self.vocabulary_path.as_mut(),
            self.prompt_path.as_mut(),
            self.prompts_dir.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            rebase(p);
        }
        self
    }
}

/// Overlay each key of `data` onto the defaults, skipping keys whose value
/// does not fit the field.
fn merge_onto_defaults(data: &Map<String, Value>, path: &Path) -> Result<Config, ConfigError> {
    let mut merged = match serde_json::to_value(Config::default())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in data {
        let mut candidate = merged.clone();
        candidate.insert(key.clone(), value.clone());
        match serde_json::from_value::<Config>(Value::Object(candidate)) {
            Ok(_) => {
                merged.insert(key.clone(), value.clone());
            }
            Err(e) => tracing::warn!(
                "Ignoring invalid '{}' in {}: {}. Using the default.",
                key,
                path.display(),
                e
            ),
        }
    }
    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// Loads and persists a [`Config`] file.
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Load `path`, creating or repairing it as needed.
    ///
    /// A missing file is created with defaults. An unreadable or invalid file
    /// is replaced with defaults (logged as a warning). A partial file gets the
    /// missing fields filled in and is written back. A field with the wrong
    /// type falls back to its default on its own; the other fields and any
    /// unknown keys are kept.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    "Could not read {}: {}. Resetting to defaults.",
                    path.display(),
                    e
                );
                Some(String::new())
            }
        };

        let Some(raw) = raw else {
            tracing::info!("Creating default config at {}", path.display());
            let manager = Self {
                path,
                config: Config::default(),
            };
            manager.save().await?;
            return Ok(manager);
        };

        let on_disk = match serde_json::from_str::<Value>(&raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => {
                tracing::warn!(
                    "{} does not hold a JSON object. Resetting to defaults.",
                    path.display()
                );
                Value::Null
            }
            Err(e) if !raw.is_empty() => {
                tracing::warn!(
                    "Failed to parse {}: {}. Resetting to defaults.",
                    path.display(),
                    e
                );
                Value::Null
            }
            Err(_) => Value::Null,
        };

        let config = match &on_disk {
            Value::Object(data) => merge_onto_defaults(data, &path)?,
            _ => Config::default(),
        };

        let manager = Self { path, config };
        if serde_json::to_value(&manager.config)? != on_disk {
            tracing::debug!("Writing merged config to {}", manager.path.display());
            manager.save().await?;
        }
        Ok(manager)
    }

    /// Write the config as pretty JSON with a trailing newline.
    pub async fn save(&self) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let mut body = serde_json::to_string_pretty(&self.config)?;
        body.push('\n');
        tokio::fs::write(&self.path, body).await.map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let manager = ConfigManager::load(&path).await.unwrap();

        assert_eq!(manager.config(), &Config::default());
        let saved = read_json(&path);
        assert_eq!(saved["default_model"], json!("gpt-4o-mini"));
        assert_eq!(saved["default_creativity"], json!(0.4));
        assert_eq!(saved["api_key"], json!(""));
        assert!(saved.get("vocabulary_path").is_none());
    }

    #[tokio::test]
    async fn test_partial_file_is_merged_and_saved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "sk-test", "max_retries": 5}"#).unwrap();

        let config = ConfigManager::load(&path).await.unwrap().into_config();

        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.default_model, "gpt-4o-mini");
        let saved = read_json(&path);
        assert_eq!(saved["api_key"], json!("sk-test"));
        assert_eq!(saved["retry_delay_secs"], json!(3.0));
    }

    #[tokio::test]
    async fn test_complete_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let body = serde_json::to_string(&Config::default()).unwrap();
        std::fs::write(&path, &body).unwrap();

        ConfigManager::load(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), body);
    }

    #[tokio::test]
    async fn test_invalid_json_resets_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let manager = ConfigManager::load(&path).await.unwrap();

        assert_eq!(manager.config(), &Config::default());
        assert_eq!(read_json(&path)["default_model"], json!("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_invalid_field_keeps_other_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "sk-keep", "max_retries": -1}"#).unwrap();

        let config = ConfigManager::load(&path).await.unwrap().into_config();

        assert_eq!(config.api_key, "sk-keep");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        let saved = read_json(&path);
        assert_eq!(saved["api_key"], json!("sk-keep"));
        assert_eq!(saved["max_retries"], json!(DEFAULT_MAX_RETRIES));
    }

    #[tokio::test]
    async fn test_unknown_keys_survive_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key": "sk-x", "theme": "dark", "window": {"w": 800}}"#)
            .unwrap();

        let config = ConfigManager::load(&path).await.unwrap().into_config();

        assert_eq!(config.extra["theme"], json!("dark"));
        let saved = read_json(&path);
        assert_eq!(saved["theme"], json!("dark"));
        assert_eq!(saved["window"], json!({"w": 800}));
        assert_eq!(saved["default_model"], json!("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_pricing_overrides_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"pricing": {"my-model": {"input_cost_per_1k": 0.01, "output_cost_per_1k": 0.02}}}"#,
        )
        .unwrap();

        let config = ConfigManager::load(&path).await.unwrap().into_config();

        let pricing = config.pricing["my-model"];
        assert_eq!(pricing.input_cost_per_1k, 0.01);
        assert_eq!(pricing.output_cost_per_1k, 0.02);
    }

    #[test]
    fn test_api_key_resolution() {
        let mut config = Config::default();
        assert_eq!(config.resolve_api_key(None), None);
        assert_eq!(
            config.resolve_api_key(Some("  sk-env ".into())),
            Some("sk-env".to_string())
        );

        config.api_key = "sk-file".into();
        assert_eq!(
            config.resolve_api_key(Some("sk-env".into())),
            Some("sk-file".to_string())
        );
    }

    #[test]
    fn test_relative_paths_rebased() {
        let config = Config {
            vocabulary_path: Some("vocab.txt".into()),
            ..Default::default()
        }
        .with_base_dir(Path::new("/srv/firekey"));

        assert_eq!(config.cache_dir, PathBuf::from("/srv/firekey/cache"));
        assert_eq!(config.profiles_dir, PathBuf::from("/srv/firekey/profiles"));
        assert_eq!(config.prompts_dir, None);
        assert_eq!(
            config.vocabulary_path,
            Some(PathBuf::from("/srv/firekey/vocab.txt"))
        );
    }
}
