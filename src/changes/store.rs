// ABOUTME: File storage behind the change log - where writes, reverts, and
// ABOUTME: conflict resolutions land. In-memory and directory-backed stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoordError;
use crate::model::normalize_path;

/// Trait for reading and writing the current content of files.
///
/// Implement this trait to back the coordinator with custom storage
/// (a working tree, an object store, a database column, etc.).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Current content of `path`, or None if it does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>, anyhow::Error>;

    /// Create or overwrite `path`.
    async fn write(&self, path: &str, content: &str) -> Result<(), anyhow::Error>;

    /// Remove `path`. Removing a missing file is not an error.
    async fn remove(&self, path: &str) -> Result<(), anyhow::Error>;

    /// Every stored path.
    async fn list(&self) -> Result<Vec<String>, anyhow::Error>;
}

/// In-memory file store.
///
/// Useful for tests and for sessions where file content lives only as long
/// as the coordinator.
#[derive(Default)]
pub struct MemoryFileStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryFileStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn read(&self, path: &str) -> Result<Option<String>, anyhow::Error> {
        Ok(self.files.read().await.get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), anyhow::Error> {
        self.files
            .write()
            .await
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), anyhow::Error> {
        self.files.write().await.remove(path);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, anyhow::Error> {
        Ok(self.files.read().await.keys().cloned().collect())
    }
}

/// File store rooted at a directory on disk.
///
/// Paths are taken relative to the root in their [`normalize_path`] form.
/// Paths that would leave the root are rejected.
pub struct DirFileStore {
    root: PathBuf,
}

impl DirFileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, CoordError> {
        let canonical = normalize_path(path)?;
        Ok(canonical.split('/').fold(self.root.clone(), |dir, part| dir.join(part)))
    }
}

#[async_trait]
impl FileStore for DirFileStore {
    async fn read(&self, path: &str) -> Result<Option<String>, anyhow::Error> {
        let full = self.resolve(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), anyhow::Error> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), anyhow::Error> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, anyhow::Error> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let parts: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    found.push(parts.join("/"));
                }
            }
        }

        found.sort();
        Ok(found)
    }
}
