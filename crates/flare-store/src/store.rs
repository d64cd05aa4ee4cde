//! Partition store
//!
//! Generates, writes and reads partitions through a [`StorageBackend`].
//! Writes are per-partition and concurrent, but a set of partitions for one
//! dataset version is committed all-or-nothing: on a permanent failure
//! every partition already written for that attempt is deleted.

use crate::backend::{MemoryBackend, StorageBackend, WriteMode};
use crate::checksum::Checksum;
use crate::dataset::Dataset;
use crate::error::{StoreError, StoreResult};
use crate::partition::{decode_records, EncodedPartition, Partition};
use crate::record::{generate_records, Record};
use chrono::Utc;
use futures::future::join_all;
use moka::future::Cache;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on partitions per dataset version
pub const MAX_PARTITIONS: u32 = 10_000;

/// Store tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Nominal bytes covered by one partition
    pub partition_unit_bytes: u64,
    /// Nominal width of one row, used to size generated partitions
    pub nominal_record_bytes: u64,
    /// Hard cap on generated rows per partition
    pub max_records_per_partition: u64,
    /// Attempts per partition write before giving up
    pub write_attempts: u32,
    /// Backoff unit between attempts (attempt n waits n * unit)
    pub retry_backoff_ms: u64,
    /// Seed for generated records
    pub seed: u64,
    /// Persist manifests and pointers through the backend
    pub persist_manifests: bool,
    /// Decoded partitions kept in the read cache
    pub cache_capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            partition_unit_bytes: 32 * 1024 * 1024,
            nominal_record_bytes: 1024,
            max_records_per_partition: 5_000,
            write_attempts: 3,
            retry_backoff_ms: 10,
            seed: 42,
            persist_manifests: true,
            cache_capacity: 256,
        }
    }
}

impl StoreConfig {
    /// Check limits
    ///
    /// # Errors
    /// Returns `StoreError::InvalidInput` for zero sizes or attempts
    pub fn validate(&self) -> StoreResult<()> {
        if self.partition_unit_bytes == 0 || self.nominal_record_bytes == 0 {
            return Err(StoreError::invalid("partition and record sizes must be non-zero"));
        }
        if self.max_records_per_partition == 0 {
            return Err(StoreError::invalid("max_records_per_partition must be non-zero"));
        }
        if self.write_attempts == 0 {
            return Err(StoreError::invalid("write_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Reads and writes partitions; storage-backend agnostic
#[derive(Debug)]
pub struct PartitionStore {
    backend: Arc<dyn StorageBackend>,
    config: StoreConfig,
    /// Decoded partitions by checksum; partitions are write-once so entries never go stale
    cache: Cache<Checksum, Arc<Vec<Record>>>,
}

impl PartitionStore {
    /// Create store over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Self {
        let cache = Cache::new(config.cache_capacity);
        Self {
            backend,
            config,
            cache,
        }
    }

    /// Store over a fresh in-memory backend
    #[must_use]
    pub fn in_memory(config: StoreConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), config)
    }

    /// Underlying backend
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// `max(min_partitions, ceil(target_size / unit))`
    #[must_use]
    pub fn partition_count(&self, target_size: u64, min_partitions: u32) -> u32 {
        let by_size = target_size.div_ceil(self.config.partition_unit_bytes);
        let by_size = u32::try_from(by_size).unwrap_or(u32::MAX);
        by_size.max(min_partitions)
    }

    /// Create version 1 of a dataset with generated records
    ///
    /// Does not register the dataset anywhere; see
    /// [`crate::VersionRegistry::create_dataset`].
    ///
    /// # Errors
    /// - `InvalidInput` for empty names, zero sizes or too many partitions
    /// - `WriteFailed` if any partition cannot be written (nothing is left behind)
    pub async fn create_dataset(
        &self,
        name: &str,
        target_size: u64,
        min_partitions: u32,
    ) -> StoreResult<Dataset> {
        validate_name(name)?;
        if target_size == 0 {
            return Err(StoreError::invalid("target size must be greater than zero"));
        }
        if min_partitions == 0 {
            return Err(StoreError::invalid("min_partitions must be at least 1"));
        }
        let count = self.partition_count(target_size, min_partitions);
        if count > MAX_PARTITIONS {
            return Err(StoreError::invalid(format!(
                "{count} partitions exceeds the limit of {MAX_PARTITIONS}"
            )));
        }

        let per_partition = self.records_per_partition(target_size, count);
        let seed = self.config.seed;
        let base = name.to_string();
        tracing::debug!(
            dataset = %base,
            partitions = count,
            records_per_partition = per_partition,
            "generating partitions"
        );

        let encoded = tokio::task::spawn_blocking(move || {
            (0..count)
                .into_par_iter()
                .map(|index| {
                    #[allow(clippy::cast_possible_wrap)]
                    let first_id = (u64::from(index) * per_partition) as i64;
                    let records = generate_records(seed, index, first_id, per_partition);
                    EncodedPartition::encode(&base, 1, index, &records)
                })
                .collect::<StoreResult<Vec<_>>>()
        })
        .await??;

        let partitions = self.write_all(encoded).await?;
        let dataset = Dataset {
            name: name.to_string(),
            version: 1,
            created_at: Utc::now(),
            partitions,
        };
        tracing::info!(
            dataset = %dataset.name,
            partitions = dataset.partition_count(),
            records = dataset.total_records(),
            bytes = dataset.total_bytes(),
            "dataset created"
        );
        Ok(dataset)
    }

    fn records_per_partition(&self, target_size: u64, partitions: u32) -> u64 {
        let share = target_size / u64::from(partitions.max(1));
        (share / self.config.nominal_record_bytes).clamp(1, self.config.max_records_per_partition)
    }

    /// Encode and write one version's partitions from already-transformed records
    ///
    /// # Errors
    /// Returns the first permanent write failure; nothing is left behind
    pub async fn write_version(
        &self,
        base: &str,
        version: u32,
        partitions: Vec<Vec<Record>>,
    ) -> StoreResult<Vec<Partition>> {
        let base_owned = base.to_string();
        let encoded = tokio::task::spawn_blocking(move || {
            partitions
                .par_iter()
                .enumerate()
                .map(|(index, records)| {
                    let index = u32::try_from(index)
                        .map_err(|_| StoreError::invalid("partition index overflow"))?;
                    EncodedPartition::encode(&base_owned, version, index, records)
                })
                .collect::<StoreResult<Vec<_>>>()
        })
        .await??;
        self.write_all(encoded).await
    }

    /// Write partitions concurrently; all-or-nothing
    async fn write_all(&self, encoded: Vec<EncodedPartition>) -> StoreResult<Vec<Partition>> {
        let results = join_all(encoded.into_iter().map(|p| self.write_with_retry(p))).await;

        let mut written = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(partition) => written.push(partition),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            tracing::error!(
                error = %err,
                discarded = written.len(),
                "partition write failed, discarding attempt"
            );
            self.discard(&written).await;
            return Err(err);
        }

        written.sort_by_key(|p| p.index);
        Ok(written)
    }

    async fn write_with_retry(&self, partition: EncodedPartition) -> StoreResult<Partition> {
        let attempts = self.config.write_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self
                .backend
                .put(&partition.meta.locator, partition.bytes.clone(), WriteMode::CreateNew)
                .await
            {
                Ok(()) => {
                    tracing::debug!(
                        partition = %partition.meta.id,
                        checksum = %partition.meta.checksum.short(),
                        "partition written"
                    );
                    return Ok(partition.meta);
                }
                // a taken slot will not free itself up
                Err(e @ StoreError::ObjectExists(_)) => {
                    last_error = e.to_string();
                    break;
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        partition = %partition.meta.id,
                        attempt,
                        error = %e,
                        "partition write failed"
                    );
                    if attempt < attempts {
                        let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        Err(StoreError::WriteFailed {
            partition: partition.meta.id,
            attempts,
            reason: last_error,
        })
    }

    /// Best-effort removal of partitions from an aborted attempt
    pub async fn discard(&self, partitions: &[Partition]) {
        for partition in partitions {
            if let Err(e) = self.backend.delete(&partition.locator).await {
                tracing::warn!(partition = %partition.id, error = %e, "failed to discard partition");
            }
        }
    }

    /// Raw bytes of a partition, verified against its checksum
    ///
    /// # Errors
    /// - `ObjectNotFound` if the backend lost the object
    /// - `ChecksumMismatch` if the bytes changed since the write
    pub async fn read_partition_bytes(&self, partition: &Partition) -> StoreResult<Vec<u8>> {
        let bytes = self.backend.get(&partition.locator).await?;
        let actual = Checksum::compute(&bytes);
        if actual != partition.checksum {
            return Err(StoreError::ChecksumMismatch {
                locator: partition.locator.clone(),
                expected: partition.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(bytes)
    }

    /// Decoded records of a partition (cached)
    ///
    /// # Errors
    /// Same as [`Self::read_partition_bytes`], plus decode failures
    pub async fn read_partition(&self, partition: &Partition) -> StoreResult<Arc<Vec<Record>>> {
        if let Some(records) = self.cache.get(&partition.checksum).await {
            return Ok(records);
        }
        let bytes = self.read_partition_bytes(partition).await?;
        let records = Arc::new(decode_records(&bytes)?);
        self.cache.insert(partition.checksum, Arc::clone(&records)).await;
        Ok(records)
    }

    /// Persist a JSON document; write-once unless `overwrite`
    ///
    /// # Errors
    /// Returns backend or serialization errors
    pub async fn put_document<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        overwrite: bool,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let mode = if overwrite {
            WriteMode::Overwrite
        } else {
            WriteMode::CreateNew
        };
        self.backend.put(key, bytes, mode).await
    }

    /// Best-effort removal of JSON documents
    pub async fn discard_documents(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.backend.delete(key).await {
                tracing::warn!(key = %key, error = %e, "failed to discard document");
            }
        }
    }

    /// Load a JSON document
    ///
    /// # Errors
    /// Returns backend or deserialization errors
    pub async fn get_document<T: for<'de> Deserialize<'de>>(&self, key: &str) -> StoreResult<T> {
        let bytes = self.backend.get(key).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Dataset names become storage key prefixes, so keep them boring
///
/// # Errors
/// Returns `InvalidInput` for empty names or characters outside `[A-Za-z0-9_-]`
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::invalid("dataset name must not be empty"));
    }
    if name.len() > 128 {
        return Err(StoreError::invalid("dataset name longer than 128 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StoreError::invalid(format!(
            "dataset name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> StoreConfig {
        StoreConfig {
            partition_unit_bytes: 1024,
            nominal_record_bytes: 64,
            max_records_per_partition: 50,
            ..StoreConfig::default()
        }
    }

    #[test]
    fn partition_count_rules() {
        let store = PartitionStore::in_memory(small_config());
        assert_eq!(store.partition_count(1, 4), 4);
        assert_eq!(store.partition_count(1024 * 10, 4), 10);
        assert_eq!(store.partition_count(1024 * 10 + 1, 4), 11);
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("d1").is_ok());
        assert!(validate_name("sales-2024_q1").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../x").is_err());
        assert!(validate_name("a b").is_err());
    }

    #[tokio::test]
    async fn create_dataset_writes_all_partitions() {
        let store = PartitionStore::in_memory(small_config());
        let ds = store.create_dataset("d1", 4096, 2).await.unwrap();
        assert_eq!(ds.version, 1);
        assert_eq!(ds.partition_count(), 4);
        assert!(ds.total_records() > 0);
        for (i, p) in ds.partitions.iter().enumerate() {
            assert_eq!(p.index as usize, i);
            let bytes = store.read_partition_bytes(p).await.unwrap();
            assert_eq!(bytes.len() as u64, p.byte_size);
        }
    }

    #[tokio::test]
    async fn create_dataset_rejects_bad_input() {
        let store = PartitionStore::in_memory(small_config());
        assert!(store.create_dataset("d1", 0, 1).await.unwrap_err().is_validation());
        assert!(store.create_dataset("d1", 10, 0).await.unwrap_err().is_validation());
        assert!(store.create_dataset("", 10, 1).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn read_partition_is_cached_and_decoded() {
        let store = PartitionStore::in_memory(small_config());
        let ds = store.create_dataset("d1", 1024, 1).await.unwrap();
        let p = &ds.partitions[0];
        let a = store.read_partition(p).await.unwrap();
        let b = store.read_partition(p).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len() as u64, p.record_count);
    }

    #[tokio::test]
    async fn tampered_bytes_fail_checksum() {
        let store = PartitionStore::in_memory(small_config());
        let ds = store.create_dataset("d1", 1024, 1).await.unwrap();
        let p = &ds.partitions[0];
        store
            .backend()
            .put(&p.locator, b"[]".to_vec(), WriteMode::Overwrite)
            .await
            .unwrap();
        let err = store.read_partition_bytes(p).await.unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }
}
