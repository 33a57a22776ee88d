//! On-disk result cache: one pretty-printed JSON file per item.
//!
//! Entries live at `<root>/<key>.json` and are never expired. A forced
//! reprocess simply overwrites the entry.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::error::CacheError;
use super::Payload;

/// Directory-backed cache keyed by item file name.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    /// Open the cache rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| CacheError::CreateDir {
                path: root.clone(),
                source,
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache key for an item: its base file name.
    ///
    /// Items sharing a base name share an entry; callers keep names unique.
    pub fn key_for(item: &Path) -> Option<String> {
        item.file_name().map(|n| n.to_string_lossy().to_string())
    }

    /// Location of the entry for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    pub async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    pub async fn load(&self, key: &str) -> Result<Payload, CacheError> {
        let bytes = tokio::fs::read(self.path_for(key))
            .await
            .map_err(|source| CacheError::Io {
                key: key.to_string(),
                source,
            })?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
                key: key.to_string(),
                source,
            })?;
        match value {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(CacheError::NotAnObject {
                key: key.to_string(),
            }),
        }
    }

    /// Persist `payload` under `key` and return the entry path.
    ///
    /// Writes to a sibling temp file and renames it into place, so readers
    /// only ever see the previous entry or the complete new one.
    pub async fn store(&self, key: &str, payload: &Payload) -> Result<PathBuf, CacheError> {
        let io_err = |source| CacheError::Io {
            key: key.to_string(),
            source,
        };

        let body = serde_json::to_string_pretty(payload).map_err(|source| CacheError::Decode {
            key: key.to_string(),
            source,
        })?;

        let target = self.path_for(key);
        let temp = self
            .root
            .join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));

        tokio::fs::write(&temp, body).await.map_err(io_err)?;
        if let Err(err) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_err(err));
        }

        tracing::debug!("Cached result for '{}' at {}", key, target.display());
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_nested_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("a/b/cache");

        let cache = ResultCache::open(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(cache.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).await.unwrap();
        let data = payload(json!({"file_name": "clip.mov", "title": "Sunset"}));

        assert!(!cache.exists("clip.mov").await);
        let path = cache.store("clip.mov", &data).await.unwrap();

        assert_eq!(path, dir.path().join("clip.mov.json"));
        assert!(cache.exists("clip.mov").await);
        assert_eq!(cache.load("clip.mov").await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_store_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).await.unwrap();

        cache.store("a.txt", &payload(json!({"v": 1}))).await.unwrap();
        cache.store("a.txt", &payload(json!({"v": 2}))).await.unwrap();

        assert_eq!(cache.load("a.txt").await.unwrap()["v"], json!(2));
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_entry_is_pretty_printed() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).await.unwrap();

        let path = cache.store("a.txt", &payload(json!({"v": 1}))).await.unwrap();

        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("\n  \"v\": 1"));
    }

    #[tokio::test]
    async fn test_load_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let cache = ResultCache::open(dir.path()).await.unwrap();
        std::fs::write(cache.path_for("list"), "[1, 2]").unwrap();

        let err = cache.load("list").await.unwrap_err();
        assert!(matches!(err, CacheError::NotAnObject { .. }));
    }

    #[test]
    fn test_key_is_base_name() {
        assert_eq!(
            ResultCache::key_for(Path::new("/media/shots/file_a.txt")).as_deref(),
            Some("file_a.txt")
        );
        assert_eq!(ResultCache::key_for(Path::new("/")), None);
    }
}
