use async_trait::async_trait;
use flare_store::prelude::*;
use flare_store::{MemoryBackend, StorageBackend, WriteMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn small_config() -> StoreConfig {
    StoreConfig {
        partition_unit_bytes: 4096,
        nominal_record_bytes: 128,
        max_records_per_partition: 64,
        retry_backoff_ms: 1,
        ..StoreConfig::default()
    }
}

fn registry_with(backend: Arc<dyn StorageBackend>) -> Arc<VersionRegistry> {
    let store = Arc::new(PartitionStore::new(backend, small_config()));
    Arc::new(VersionRegistry::new(store))
}

/// Fails every partition write whose key contains `needle`
#[derive(Debug)]
struct FailingBackend {
    inner: MemoryBackend,
    needle: String,
    attempts: AtomicUsize,
}

#[async_trait]
impl StorageBackend for FailingBackend {
    fn scheme(&self) -> &'static str {
        "failing"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()> {
        if key.contains(&self.needle) {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Backend("disk on fire".into()));
        }
        self.inner.put(key, bytes, mode).await
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }
}

/// Delays every write whose key contains `needle`
#[derive(Debug)]
struct SlowBackend {
    inner: MemoryBackend,
    needle: String,
    delay: std::time::Duration,
}

#[async_trait]
impl StorageBackend for SlowBackend {
    fn scheme(&self) -> &'static str {
        "slow"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()> {
        if key.contains(&self.needle) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.put(key, bytes, mode).await
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }
}

/// Fails pointer writes while `fail_pointer` is set
#[derive(Debug, Default)]
struct PointerOutageBackend {
    inner: MemoryBackend,
    fail_pointer: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl StorageBackend for PointerOutageBackend {
    fn scheme(&self) -> &'static str {
        "pointer-outage"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, mode: WriteMode) -> StoreResult<()> {
        if key.ends_with("pointer.json") && self.fail_pointer.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("pointer store unavailable".into()));
        }
        self.inner.put(key, bytes, mode).await
    }

    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }
}

#[tokio::test]
async fn test_create_dataset_d1_point_one_gb() {
    let store = Arc::new(PartitionStore::in_memory(StoreConfig::default()));
    let registry = VersionRegistry::new(store);
    let ds = registry
        .create_dataset("d1", 100 * 1024 * 1024, 4)
        .await
        .unwrap();
    assert!(ds.partition_count() >= 4);
    assert!(ds.total_records() > 0);
}

#[tokio::test]
async fn test_rollback_reads_back_byte_identical() {
    let registry = registry_with(Arc::new(MemoryBackend::new()));
    let v1 = registry.create_dataset("sales", 16 * 1024, 2).await.unwrap();
    let store = registry.store();

    let mut original = Vec::new();
    for p in &v1.partitions {
        original.push(store.read_partition_bytes(p).await.unwrap());
    }

    let double = Modification::ScalarTransform {
        field: "value".into(),
        op: ScalarOp::Multiply,
        factor: 2.0,
    };
    registry.create_version("sales", &[double]).await.unwrap();
    registry.rollback("sales", 1).await.unwrap();

    let current = registry.resolve("sales").unwrap();
    assert_eq!(current.version, 1);
    for (p, before) in current.partitions.iter().zip(&original) {
        let after = store.read_partition_bytes(p).await.unwrap();
        assert_eq!(&after, before);
        assert!(p.checksum.matches(&after));
    }
}

#[tokio::test]
async fn test_identity_transform_keeps_record_counts() {
    let registry = registry_with(Arc::new(MemoryBackend::new()));
    let v1 = registry.create_dataset("d", 20 * 1024, 3).await.unwrap();
    let v2 = registry.create_version("d", &[]).await.unwrap();

    let before: Vec<u64> = v1.partitions.iter().map(|p| p.record_count).collect();
    let after: Vec<u64> = v2.partitions.iter().map(|p| p.record_count).collect();
    assert_eq!(before, after);
    // same content, different slots
    assert_ne!(v1.partitions[0].locator, v2.partitions[0].locator);
    assert_eq!(v1.partitions[0].checksum, v2.partitions[0].checksum);
}

#[tokio::test]
async fn test_modifications_produce_new_partitions_only() {
    let backend = Arc::new(MemoryBackend::new());
    let registry = registry_with(backend.clone());
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();
    let before = backend.keys();

    let filter = Modification::Filter {
        predicate: Predicate::compare("category", CmpOp::Eq, "alpha"),
    };
    let v2 = registry.create_version("d", &[filter]).await.unwrap();
    let after = backend.keys();

    for key in &before {
        if key.ends_with("pointer.json") {
            continue;
        }
        assert!(after.contains(key), "lost {key}");
    }
    for p in &v2.partitions {
        assert!(!before.contains(&p.locator));
        let records = registry.store().read_partition(p).await.unwrap();
        assert!(records
            .iter()
            .all(|r| r.get("category") == Some(&FieldValue::from("alpha"))));
    }
}

#[tokio::test]
async fn test_failed_write_aborts_creation_and_cleans_up() {
    let backend = Arc::new(FailingBackend {
        inner: MemoryBackend::new(),
        needle: "part-00002".into(),
        attempts: AtomicUsize::new(0),
    });
    let registry = registry_with(backend.clone());

    let err = registry.create_dataset("d", 16 * 1024, 4).await.unwrap_err();
    assert!(matches!(err, StoreError::WriteFailed { attempts: 3, .. }));
    assert_eq!(backend.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(backend.inner.object_count(), 0, "partial partitions left behind");
    assert!(registry.resolve("d").unwrap_err().is_not_found());

    // the name is free again
    assert!(registry.list_datasets().is_empty());
}

#[tokio::test]
async fn test_failed_version_write_leaves_pointer_untouched() {
    let backend = Arc::new(FailingBackend {
        inner: MemoryBackend::new(),
        needle: "/v2/part-00001".into(),
        attempts: AtomicUsize::new(0),
    });
    let registry = registry_with(backend.clone());
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();

    assert!(registry.create_version("d", &[]).await.is_err());
    let pointer = registry.pointer("d").unwrap();
    assert_eq!(pointer.current_version, 1);
    assert_eq!(pointer.versions(), vec![1]);
    assert!(!backend.inner.keys().iter().any(|k| k.contains("/v2/")));
}

#[tokio::test]
async fn test_concurrent_versions_get_distinct_numbers() {
    let registry = registry_with(Arc::new(MemoryBackend::new()));
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.create_version("d", &[]).await })
        })
        .collect();

    let mut versions = Vec::new();
    for handle in handles {
        versions.push(handle.await.unwrap().unwrap().version);
    }
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3, 4, 5]);
    assert_eq!(registry.pointer("d").unwrap().history.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_query_sees_snapshot_despite_concurrent_rollback() {
    let registry = registry_with(Arc::new(MemoryBackend::new()));
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();
    registry.create_version("d", &[]).await.unwrap();

    let engine = QueryEngine::new(
        Arc::clone(&registry),
        flare_store::QueryConfig {
            provisioning_per_partition_ms: 50,
        },
    );
    let query = tokio::spawn(async move { engine.execute_query("d", &Query::default()).await });

    // let the query resolve its snapshot and park in provisioning
    tokio::task::yield_now().await;
    registry.rollback("d", 1).await.unwrap();

    let result = query.await.unwrap().unwrap();
    assert_eq!(result.version, 2);
    assert_eq!(registry.resolve("d").unwrap().version, 1);
}

#[tokio::test]
async fn test_fs_backend_persists_manifest_and_pointer() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(Arc::new(flare_store::FsBackend::new(dir.path())));
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();
    registry.create_version("d", &[]).await.unwrap();
    registry.rollback("d", 1).await.unwrap();

    let pointer: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("d/pointer.json")).unwrap()).unwrap();
    assert_eq!(pointer["current_version"], 1);
    assert_eq!(pointer["history"].as_array().unwrap().len(), 2);

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(dir.path().join("d/v2/manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["name"], "d");
    assert_eq!(manifest["version"], 2);
    assert_eq!(manifest["partitions"].as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_writer_does_not_move_pointer_backwards() {
    let registry = registry_with(Arc::new(SlowBackend {
        inner: MemoryBackend::new(),
        needle: "/v2/".into(),
        delay: std::time::Duration::from_millis(300),
    }));
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();

    let (a, b) = tokio::join!(
        registry.create_version("d", &[]),
        registry.create_version("d", &[])
    );
    let mut created = vec![a.unwrap().version, b.unwrap().version];
    created.sort_unstable();
    assert_eq!(created, vec![2, 3]);

    let pointer = registry.pointer("d").unwrap();
    assert_eq!(pointer.current_version, 3);
    assert_eq!(pointer.versions(), vec![1, 2, 3]);
    assert_eq!(registry.resolve("d").unwrap().version, 3);
    assert_eq!(registry.get_version("d", 2).unwrap().version, 2);
}

#[tokio::test]
async fn test_failed_pointer_write_discards_version() {
    let backend = Arc::new(PointerOutageBackend::default());
    let registry = registry_with(backend.clone());
    registry.create_dataset("d", 8 * 1024, 2).await.unwrap();
    let objects_before = backend.inner.keys();

    backend.fail_pointer.store(true, Ordering::SeqCst);
    assert!(registry.create_version("d", &[]).await.is_err());

    assert_eq!(registry.pointer("d").unwrap().versions(), vec![1]);
    assert!(registry.get_version("d", 2).unwrap_err().is_not_found());
    assert_eq!(backend.inner.keys(), objects_before);

    // the reserved number is skipped, never reused
    backend.fail_pointer.store(false, Ordering::SeqCst);
    let next = registry.create_version("d", &[]).await.unwrap();
    assert_eq!(next.version, 3);
    assert_eq!(registry.pointer("d").unwrap().versions(), vec![1, 3]);
}
