//! Saved context profiles.
//!
//! A profile is a named block of operator context (brand, shoot, client
//! notes) stored as `<slug>.json` in the profiles directory. Its text is
//! merged into the `{context}` of every prompt.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to create profiles directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize profile '{name}': {source}")]
    Serialize {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A named context block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub context: String,
    /// File the profile was loaded from or saved to.
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

impl Profile {
    pub fn new(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context: context.into(),
            path: None,
        }
    }
}

/// Lower-case ASCII alphanumerics, every other run collapsed to `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Profile context first, then the operator's own text, blank-line separated.
pub fn merge_contexts(profile: Option<&Profile>, user_text: &str) -> String {
    let mut segments = Vec::new();
    if let Some(context) = profile.map(|p| p.context.trim()).filter(|c| !c.is_empty()) {
        segments.push(context);
    }
    if !user_text.is_empty() {
        segments.push(user_text);
    }
    segments.join("\n\n")
}

/// Loads and persists profiles under one directory.
pub struct ProfileManager {
    dir: PathBuf,
}

impl ProfileManager {
    /// Open `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ProfileError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All valid profiles, ordered by file name. Malformed files are skipped.
    pub async fn load_profiles(&self) -> Result<Vec<Profile>, ProfileError> {
        let io_err = |source| ProfileError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut profiles = Vec::new();
        for path in paths {
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("Skipping unreadable profile {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Profile>(&raw) {
                Ok(mut profile) => {
                    profile.name = profile.name.trim().to_string();
                    profile.path = Some(path);
                    profiles.push(profile);
                }
                Err(e) => tracing::warn!("Skipping malformed profile {}: {}", path.display(), e),
            }
        }
        Ok(profiles)
    }

    /// Look a profile up by name (case-insensitive) or by its slug.
    pub async fn find(&self, name: &str) -> Result<Option<Profile>, ProfileError> {
        let wanted = name.trim().to_lowercase();
        let slug = slugify(name);
        Ok(self
            .load_profiles()
            .await?
            .into_iter()
            .find(|p| p.name.to_lowercase() == wanted || slugify(&p.name) == slug))
    }

    /// Write `profile` to a unique `<slug>.json` and return it with its path.
    ///
    /// When `original` is given (a rename), that file may be reused as the
    /// target, and is removed if the profile moves elsewhere.
    pub async fn save(
        &self,
        profile: &Profile,
        original: Option<&Path>,
    ) -> Result<Profile, ProfileError> {
        let existing = original.or(profile.path.as_deref());
        let target = self.path_for_name(&profile.name, existing).await;

        let body = serde_json::to_string_pretty(profile).map_err(|source| {
            ProfileError::Serialize {
                name: profile.name.clone(),
                source,
            }
        })?;
        tokio::fs::write(&target, body)
            .await
            .map_err(|source| ProfileError::Io {
                path: target.clone(),
                source,
            })?;

        if let Some(original) = original.filter(|o| *o != target.as_path()) {
            if tokio::fs::try_exists(original).await.unwrap_or(false) {
                tokio::fs::remove_file(original)
                    .await
                    .map_err(|source| ProfileError::Io {
                        path: original.to_path_buf(),
                        source,
                    })?;
            }
        }

        tracing::debug!("Saved profile '{}' to {}", profile.name, target.display());
        Ok(Profile {
            name: profile.name.clone(),
            context: profile.context.clone(),
            path: Some(target),
        })
    }

    /// Remove the profile's file. A profile without a file is a no-op.
    pub async fn delete(&self, profile: &Profile) -> Result<(), ProfileError> {
        let Some(path) = &profile.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProfileError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    async fn path_for_name(&self, name: &str, existing: Option<&Path>) -> PathBuf {
        let slug = slugify(name);
        let base = if slug.is_empty() { "profile" } else { slug.as_str() };
        let mut candidate = base.to_string();
        let mut counter = 1;
        loop {
            let path = self.dir.join(format!("{}.json", candidate));
            if existing == Some(path.as_path()) {
                return path;
            }
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return path;
            }
            counter += 1;
            candidate = format!("{}-{}", base, counter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn manager(dir: &TempDir) -> ProfileManager {
        ProfileManager::open(dir.path().join("profiles")).await.unwrap()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Summer Shoot 2024!"), "summer-shoot-2024");
        assert_eq!(slugify("  --Brand__X-- "), "brand-x");
        assert_eq!(slugify("¡¿"), "");
    }

    #[test]
    fn test_merge_contexts() {
        let profile = Profile::new("Brand", "  Outdoor gear brand.  ");
        assert_eq!(
            merge_contexts(Some(&profile), "Shot in Norway"),
            "Outdoor gear brand.\n\nShot in Norway"
        );
        assert_eq!(merge_contexts(Some(&Profile::new("Empty", " ")), "x"), "x");
        assert_eq!(merge_contexts(None, ""), "");
    }

    #[tokio::test]
    async fn test_save_assigns_unique_slugs() {
        let dir = TempDir::new().unwrap();
        let profiles = manager(&dir).await;

        let first = profiles.save(&Profile::new("Client A", "one"), None).await.unwrap();
        let second = profiles.save(&Profile::new("client a", "two"), None).await.unwrap();
        let unnamed = profiles.save(&Profile::new("!!!", "three"), None).await.unwrap();

        assert_eq!(first.path.unwrap(), profiles.dir().join("client-a.json"));
        assert_eq!(second.path.unwrap(), profiles.dir().join("client-a-2.json"));
        assert_eq!(unnamed.path.unwrap(), profiles.dir().join("profile.json"));
    }

    #[tokio::test]
    async fn test_resave_keeps_file_and_rename_moves_it() {
        let dir = TempDir::new().unwrap();
        let profiles = manager(&dir).await;
        let saved = profiles.save(&Profile::new("Client A", "one"), None).await.unwrap();

        let updated = Profile {
            context: "updated".into(),
            ..saved.clone()
        };
        let resaved = profiles.save(&updated, None).await.unwrap();
        assert_eq!(resaved.path, saved.path);

        let renamed = Profile::new("Client B", "updated");
        let moved = profiles
            .save(&renamed, saved.path.as_deref())
            .await
            .unwrap();
        assert_eq!(moved.path.unwrap(), profiles.dir().join("client-b.json"));
        assert!(!profiles.dir().join("client-a.json").exists());
    }

    #[tokio::test]
    async fn test_load_sorted_and_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let profiles = manager(&dir).await;
        std::fs::write(profiles.dir().join("b.json"), r#"{"name": " Beta ", "context": "b"}"#)
            .unwrap();
        std::fs::write(profiles.dir().join("a.json"), r#"{"name": "Alpha"}"#).unwrap();
        std::fs::write(profiles.dir().join("bad.json"), "{nope").unwrap();
        std::fs::write(profiles.dir().join("typed.json"), r#"{"name": 3}"#).unwrap();
        std::fs::write(profiles.dir().join("notes.txt"), "ignored").unwrap();

        let loaded = profiles.load_profiles().await.unwrap();

        let names: Vec<_> = loaded.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        assert_eq!(loaded[0].context, "");
        assert_eq!(loaded[1].path.as_deref(), Some(profiles.dir().join("b.json").as_path()));
    }

    #[tokio::test]
    async fn test_find_and_delete() {
        let dir = TempDir::new().unwrap();
        let profiles = manager(&dir).await;
        profiles
            .save(&Profile::new("Summer Shoot", "beach, sun"), None)
            .await
            .unwrap();

        let found = profiles.find("summer shoot").await.unwrap().unwrap();
        assert_eq!(found.context, "beach, sun");
        assert!(profiles.find("summer-shoot").await.unwrap().is_some());
        assert!(profiles.find("winter").await.unwrap().is_none());

        profiles.delete(&found).await.unwrap();
        assert!(profiles.load_profiles().await.unwrap().is_empty());
        profiles.delete(&found).await.unwrap();
    }
}
