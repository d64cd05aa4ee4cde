//! Per-orchestrator data plane: backend, partition store, versions, queries

use crate::config::FlareConfig;
use flare_store::{
    FsBackend, MemoryBackend, PartitionStore, QueryEngine, StorageBackend, VersionRegistry,
};
use std::sync::Arc;

/// Store, version registry and query engine sharing one backend
#[derive(Debug, Clone)]
pub struct Registry {
    store: Arc<PartitionStore>,
    versions: Arc<VersionRegistry>,
    queries: Arc<QueryEngine>,
}

impl Registry {
    /// Filesystem-backed if `config.data_dir` is set, in memory otherwise
    #[must_use]
    pub fn new(config: &FlareConfig) -> Self {
        let backend: Arc<dyn StorageBackend> = match &config.data_dir {
            Some(dir) => Arc::new(FsBackend::new(dir.clone())),
            None => Arc::new(MemoryBackend::new()),
        };
        Self::with_backend(backend, config)
    }

    /// Registry over an explicit backend
    #[must_use]
    pub fn with_backend(backend: Arc<dyn StorageBackend>, config: &FlareConfig) -> Self {
        let store = Arc::new(PartitionStore::new(backend, config.store_config()));
        let versions = Arc::new(VersionRegistry::new(Arc::clone(&store)));
        let queries = Arc::new(QueryEngine::new(Arc::clone(&versions), config.query.clone()));
        Self {
            store,
            versions,
            queries,
        }
    }

    /// Partition store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    /// Version registry
    #[inline]
    #[must_use]
    pub fn versions(&self) -> &Arc<VersionRegistry> {
        &self.versions
    }

    /// Query engine
    #[inline]
    #[must_use]
    pub fn queries(&self) -> &Arc<QueryEngine> {
        &self.queries
    }
}
