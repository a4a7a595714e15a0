//! Path-addressed blob storage for generated images.
//!
//! Saved images live under `<root>/<subdir>/`. Images that have been
//! generated but not saved live in a per-session cache directory
//! (`<root>/cache/session-<uuid>/`) that is removed when the session ends.

use std::path::{Path, PathBuf};

use crate::error::{KismetError, Result};
use crate::model::AssetRef;

const CACHE_DIR: &str = "cache";
const SESSION_PREFIX: &str = "session-";

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    cache: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cache = session_dir(&root);
        Self { root, cache }
    }

    /// Same root, fresh cache directory.
    pub fn for_session(&self) -> Self {
        Self::new(self.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    /// Write `bytes` to `path` (relative paths are taken from the root).
    ///
    /// The data is written to a sibling temp file and renamed into place, so
    /// readers never see a partial file.
    pub async fn save(&self, bytes: &[u8], path: &Path) -> Result<PathBuf> {
        let target = self.resolve(path);
        let parent = target
            .parent()
            .ok_or_else(|| KismetError::File(format!("no parent for {}", target.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| KismetError::File(format!("failed to create {}: {e}", parent.display())))?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(KismetError::File(format!(
                "failed to write {}: {e}",
                target.display()
            )));
        }

        tracing::debug!(path = %target.display(), bytes = bytes.len(), "file saved");
        Ok(target)
    }

    /// Contents of `path`, `None` when it does not exist.
    pub async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let target = self.resolve(path);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KismetError::File(format!(
                "failed to read {}: {e}",
                target.display()
            ))),
        }
    }

    /// Store freshly generated bytes in the session cache.
    pub async fn save_cached(&self, bytes: &[u8], prefix: &str) -> Result<AssetRef> {
        let name = format!("{}-{}.png", slug(prefix), uuid::Uuid::now_v7());
        let path = self.save(bytes, &self.cache.join(name)).await?;
        Ok(AssetRef::new(path))
    }

    /// Copy an asset to `<root>/<subdir>/<name>-<uuid>.png` and return the
    /// permanent path. An asset that already lives under `<root>/<subdir>` is
    /// returned unchanged, so each saved file belongs to one record only.
    pub async fn persist(&self, asset: &AssetRef, subdir: &str, name: &str) -> Result<PathBuf> {
        let source = asset.path();
        let dir = self.root.join(subdir);
        if source.starts_with(&dir) {
            return Ok(source.to_path_buf());
        }
        let dest = dir.join(format!("{}-{}.png", slug(name), uuid::Uuid::now_v7()));
        let bytes = self
            .read(source)
            .await?
            .ok_or_else(|| KismetError::File(format!("{} no longer exists", source.display())))?;
        self.save(&bytes, &dest).await
    }

    /// Remove this session's cache directory. Returns whether anything was removed.
    pub fn purge_cache(&self) -> bool {
        match std::fs::remove_dir_all(&self.cache) {
            Ok(()) => {
                tracing::debug!(dir = %self.cache.display(), "session cache purged");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(dir = %self.cache.display(), "failed to purge session cache: {e}");
                false
            }
        }
    }

    /// Remove cache directories left behind by other sessions (for example
    /// after a crash). Returns the number of directories removed.
    pub fn purge_stale_sessions(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(self.root.join(CACHE_DIR)) else {
            return 0;
        };
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path != &self.cache)
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(SESSION_PREFIX))
            })
            .filter(|path| std::fs::remove_dir_all(path).is_ok())
            .count()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn session_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
        .join(format!("{SESSION_PREFIX}{}", uuid::Uuid::now_v7()))
}

/// Remove a file, logging instead of failing. A file that is already gone
/// counts as removed.
pub async fn remove_best_effort(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "file already gone");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to remove file: {e}");
            false
        }
    }
}

/// Lowercase ASCII alphanumerics joined by `-`, at most 40 chars.
pub(crate) fn slug(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
        if out.len() >= 40 {
            break;
        }
    }
    let out = out.trim_end_matches('-');
    if out.is_empty() {
        "image".to_string()
    } else {
        out.to_string()
    }
}
