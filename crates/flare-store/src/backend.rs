//! Storage backends
//!
//! The store only talks to [`StorageBackend`]; where bytes end up is the
//! backend's business:
//! - [`MemoryBackend`]: process-local map, the default
//! - [`FsBackend`]: one file per key under a root directory

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// How a write treats an existing object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `ObjectExists` if the key is taken (partitions, manifests)
    CreateNew,
    /// Replace any existing object (version pointers)
    Overwrite,
}

/// Byte store keyed by locator
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Short scheme name used in logs (`mem`, `file`)
    fn scheme(&self) -> &'static str;

    /// Store bytes under a key
    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()>;

    /// Fetch bytes stored under a key
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// Remove a key; removing a missing key is not an error
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Check whether a key exists
    async fn exists(&self, key: &str) -> StoreResult<bool>;
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: DashMap<String, Arc<Vec<u8>>>,
}

impl MemoryBackend {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    #[inline]
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// All stored keys, sorted
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn scheme(&self) -> &'static str {
        "mem"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()> {
        match (self.objects.entry(key.to_string()), mode) {
            (Entry::Occupied(_), WriteMode::CreateNew) => Err(StoreError::ObjectExists(key.to_string())),
            (Entry::Occupied(mut slot), WriteMode::Overwrite) => {
                slot.insert(Arc::new(bytes));
                Ok(())
            }
            (Entry::Vacant(slot), _) => {
                slot.insert(Arc::new(bytes));
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .get(key)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.contains_key(key))
    }
}

/// Filesystem backend rooted at a directory
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Create backend rooted at `root` (created lazily on first write)
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StoreError::invalid(format!("unsafe storage key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    fn scheme(&self) -> &'static str {
        "file"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io_error(parent, e))?;
        }
        match mode {
            WriteMode::CreateNew => {
                let mut file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .await
                    .map_err(|e| {
                        if e.kind() == std::io::ErrorKind::AlreadyExists {
                            StoreError::ObjectExists(key.to_string())
                        } else {
                            StoreError::io_error(&path, e)
                        }
                    })?;
                file.write_all(&bytes)
                    .await
                    .map_err(|e| StoreError::io_error(&path, e))?;
                file.sync_all().await.map_err(|e| StoreError::io_error(&path, e))
            }
            WriteMode::Overwrite => {
                // write-then-rename so readers never see a half-written pointer
                let staging = path.with_extension("tmp");
                tokio::fs::write(&staging, &bytes)
                    .await
                    .map_err(|e| StoreError::io_error(&staging, e))?;
                tokio::fs::rename(&staging, &path)
                    .await
                    .map_err(|e| StoreError::io_error(&path, e))
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::ObjectNotFound(key.to_string())
            } else {
                StoreError::io_error(&path, e)
            }
        })
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(&path, e)),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io_error(&path, e))
    }
}
