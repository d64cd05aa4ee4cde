//! Copy-on-write dataset versioning
//!
//! Each dataset family owns:
//! - an immutable [`Dataset`] per version, never edited after insertion
//! - a [`VersionPointer`] snapshot behind an `RwLock<Arc<_>>`; readers clone
//!   the `Arc`, writers swap in a whole new snapshot
//! - a version counter handing out fresh numbers to concurrent writers
//!
//! Rollback only swaps the pointer; partitions are never touched. Dropping
//! a family is the only path that deletes partitions.

use crate::dataset::{Dataset, VersionPointer};
use crate::error::{StoreError, StoreResult};
use crate::modification::{apply_pipeline, validate_pipeline, Modification};
use crate::store::{validate_name, PartitionStore};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Per-family state
#[derive(Debug)]
struct DatasetFamily {
    pointer: RwLock<Arc<VersionPointer>>,
    versions: DashMap<u32, Arc<Dataset>>,
    next_version: AtomicU32,
    /// Serializes pointer swaps with their persistence
    swap_lock: tokio::sync::Mutex<()>,
    /// Set once the family is removed from the registry
    dropped: AtomicBool,
}

impl DatasetFamily {
    fn new(dataset: Dataset) -> Self {
        let pointer = VersionPointer::initial(&dataset);
        let next = dataset.version + 1;
        let versions = DashMap::new();
        versions.insert(dataset.version, Arc::new(dataset));
        Self {
            pointer: RwLock::new(Arc::new(pointer)),
            versions,
            next_version: AtomicU32::new(next),
            swap_lock: tokio::sync::Mutex::new(()),
            dropped: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> Arc<VersionPointer> {
        Arc::clone(&*self.pointer.read())
    }

    fn swap(&self, next: VersionPointer) {
        *self.pointer.write() = Arc::new(next);
    }
}

/// Versioned dataset registry over a [`PartitionStore`]
#[derive(Debug)]
pub struct VersionRegistry {
    store: Arc<PartitionStore>,
    families: DashMap<String, Arc<DatasetFamily>>,
    /// Names whose version 1 is being written
    reserved: Mutex<HashSet<String>>,
}

impl VersionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(store: Arc<PartitionStore>) -> Self {
        Self {
            store,
            families: DashMap::new(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    fn family(&self, name: &str) -> StoreResult<Arc<DatasetFamily>> {
        self.families
            .get(name)
            .map(|f| Arc::clone(f.value()))
            .ok_or_else(|| StoreError::DatasetNotFound(name.to_string()))
    }

    /// Create a dataset family and point it at version 1
    ///
    /// # Errors
    /// - `AlreadyExists` if the name is taken (or being created concurrently)
    /// - anything [`PartitionStore::create_dataset`] returns
    pub async fn create_dataset(
        &self,
        name: &str,
        target_size: u64,
        min_partitions: u32,
    ) -> StoreResult<Arc<Dataset>> {
        validate_name(name)?;
        {
            let mut reserved = self.reserved.lock();
            if self.families.contains_key(name) || !reserved.insert(name.to_string()) {
                return Err(StoreError::AlreadyExists(name.to_string()));
            }
        }

        let result = self.create_family(name, target_size, min_partitions).await;
        self.reserved.lock().remove(name);
        result
    }

    async fn create_family(
        &self,
        name: &str,
        target_size: u64,
        min_partitions: u32,
    ) -> StoreResult<Arc<Dataset>> {
        let dataset = self
            .store
            .create_dataset(name, target_size, min_partitions)
            .await?;

        if let Err(e) = self.persist_initial(&dataset).await {
            self.store.discard(&dataset.partitions).await;
            return Err(e);
        }

        let family = Arc::new(DatasetFamily::new(dataset));
        let current = family.snapshot().current_version;
        let created = family
            .versions
            .get(&current)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| StoreError::VersionNotFound {
                name: name.to_string(),
                version: current,
            })?;
        self.families.insert(name.to_string(), family);
        Ok(created)
    }

    async fn persist_initial(&self, dataset: &Dataset) -> StoreResult<()> {
        if !self.store.config().persist_manifests {
            return Ok(());
        }
        self.store
            .put_document(&dataset.manifest_key(), dataset, false)
            .await?;
        self.store
            .put_document(
                &VersionPointer::storage_key(&dataset.name),
                &VersionPointer::initial(dataset),
                true,
            )
            .await
    }

    /// Derive a new version by applying `modifications` to every partition
    /// of the current version, then swap the pointer to it
    ///
    /// Concurrent writers each publish their own number. History stays in
    /// version order and the pointer ends on the highest published version.
    ///
    /// # Errors
    /// - `InvalidInput` for a malformed pipeline
    /// - `DatasetNotFound` for an unknown family
    /// - read, checksum or write failures; the pointer is left untouched
    pub async fn create_version(
        &self,
        base: &str,
        modifications: &[Modification],
    ) -> StoreResult<Arc<Dataset>> {
        validate_pipeline(modifications)?;
        let family = self.family(base)?;

        let source_version = family.snapshot().current_version;
        let source = family
            .versions
            .get(&source_version)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| StoreError::VersionNotFound {
                name: base.to_string(),
                version: source_version,
            })?;
        let version = family.next_version.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            dataset = base,
            from = source_version,
            to = version,
            steps = modifications.len(),
            "deriving version"
        );

        let inputs = try_join_all(source.partitions.iter().map(|p| self.store.read_partition(p))).await?;
        let pipeline = modifications.to_vec();
        let transformed = tokio::task::spawn_blocking(move || {
            inputs
                .par_iter()
                .map(|records| apply_pipeline(&pipeline, records))
                .collect::<Vec<_>>()
        })
        .await?;

        let partitions = self.store.write_version(base, version, transformed).await?;
        let dataset = Dataset {
            name: base.to_string(),
            version,
            created_at: Utc::now(),
            partitions,
        };

        if self.store.config().persist_manifests {
            if let Err(e) = self
                .store
                .put_document(&dataset.manifest_key(), &dataset, false)
                .await
            {
                self.store.discard(&dataset.partitions).await;
                return Err(e);
            }
        }

        // Published only once the pointer is persisted; until then readers
        // cannot reach the new version.
        let _guard = family.swap_lock.lock().await;
        if family.dropped.load(Ordering::SeqCst) {
            self.abandon(&dataset).await;
            return Err(StoreError::DatasetNotFound(base.to_string()));
        }
        let next = family.snapshot().published(&dataset);
        if let Err(e) = self.persist_pointer(&next).await {
            self.abandon(&dataset).await;
            return Err(e);
        }
        let current = next.current_version;
        let dataset = Arc::new(dataset);
        family.versions.insert(version, Arc::clone(&dataset));
        family.swap(next);

        tracing::info!(
            dataset = base,
            version,
            current,
            partitions = dataset.partition_count(),
            records = dataset.total_records(),
            "version created"
        );
        Ok(dataset)
    }

    /// Point the family back at an earlier version
    ///
    /// # Errors
    /// - `DatasetNotFound` for an unknown family
    /// - `VersionNotFound` if `target_version` is not in history
    pub async fn rollback(&self, base: &str, target_version: u32) -> StoreResult<Arc<VersionPointer>> {
        let family = self.family(base)?;
        let _guard = family.swap_lock.lock().await;
        let current = family.snapshot();
        if !current.contains(target_version) {
            return Err(StoreError::VersionNotFound {
                name: base.to_string(),
                version: target_version,
            });
        }

        let next = current.rolled_back(target_version);
        self.persist_pointer(&next).await?;
        family.swap(next);
        tracing::info!(
            dataset = base,
            from = current.current_version,
            to = target_version,
            "rolled back"
        );
        Ok(family.snapshot())
    }

    /// Remove a version that never made it into the pointer
    async fn abandon(&self, dataset: &Dataset) {
        self.store.discard(&dataset.partitions).await;
        if self.store.config().persist_manifests {
            self.store.discard_documents(&[dataset.manifest_key()]).await;
        }
    }

    /// Remove a family with every version's partitions, manifests and pointer
    ///
    /// Writers still deriving a version of the family fail with
    /// `DatasetNotFound` and discard what they wrote.
    ///
    /// # Errors
    /// Returns `DatasetNotFound` for an unknown family
    pub async fn drop_family(&self, name: &str) -> StoreResult<()> {
        let (_, family) = self
            .families
            .remove(name)
            .ok_or_else(|| StoreError::DatasetNotFound(name.to_string()))?;
        let _guard = family.swap_lock.lock().await;
        family.dropped.store(true, Ordering::SeqCst);

        let datasets: Vec<Arc<Dataset>> = family.versions.iter().map(|d| Arc::clone(d.value())).collect();
        family.versions.clear();
        let mut documents = vec![VersionPointer::storage_key(name)];
        for dataset in &datasets {
            self.store.discard(&dataset.partitions).await;
            documents.push(dataset.manifest_key());
        }
        if self.store.config().persist_manifests {
            self.store.discard_documents(&documents).await;
        }
        tracing::info!(dataset = name, versions = datasets.len(), "family dropped");
        Ok(())
    }

    async fn persist_pointer(&self, pointer: &VersionPointer) -> StoreResult<()> {
        if !self.store.config().persist_manifests {
            return Ok(());
        }
        self.store
            .put_document(&VersionPointer::storage_key(&pointer.name), pointer, true)
            .await
    }

    /// Dataset the family currently points at
    ///
    /// # Errors
    /// Returns `DatasetNotFound` for an unknown family
    pub fn resolve(&self, name: &str) -> StoreResult<Arc<Dataset>> {
        let family = self.family(name)?;
        let version = family.snapshot().current_version;
        family
            .versions
            .get(&version)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| StoreError::VersionNotFound {
                name: name.to_string(),
                version,
            })
    }

    /// A specific version, whether or not it is current
    ///
    /// # Errors
    /// Returns `DatasetNotFound` or `VersionNotFound`
    pub fn get_version(&self, name: &str, version: u32) -> StoreResult<Arc<Dataset>> {
        self.family(name)?
            .versions
            .get(&version)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| StoreError::VersionNotFound {
                name: name.to_string(),
                version,
            })
    }

    /// Current pointer snapshot
    ///
    /// # Errors
    /// Returns `DatasetNotFound` for an unknown family
    pub fn pointer(&self, name: &str) -> StoreResult<Arc<VersionPointer>> {
        Ok(self.family(name)?.snapshot())
    }

    /// Pointer snapshots of every family, sorted by name
    #[must_use]
    pub fn list_datasets(&self) -> Vec<Arc<VersionPointer>> {
        let mut pointers: Vec<_> = self.families.iter().map(|f| f.value().snapshot()).collect();
        pointers.sort_by(|a, b| a.name.cmp(&b.name));
        pointers
    }

    /// Number of dataset families
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// True if no family has been created
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}
