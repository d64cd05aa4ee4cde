//! Flare dataset store
//!
//! Immutable, partitioned, versioned datasets:
//! - [`PartitionStore`]: generates, writes and reads write-once partitions
//! - [`VersionRegistry`]: copy-on-write versions with atomic pointer swap and rollback
//! - [`QueryEngine`]: snapshot-isolated aggregation across a version's partitions
//! - [`StorageBackend`]: where bytes live ([`MemoryBackend`], [`FsBackend`])
//!
//! # Example
//!
//! ```no_run
//! use flare_store::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> StoreResult<()> {
//! let store = Arc::new(PartitionStore::in_memory(StoreConfig::default()));
//! let registry = Arc::new(VersionRegistry::new(store));
//! registry.create_dataset("sales", 64 * 1024 * 1024, 4).await?;
//!
//! let double = Modification::ScalarTransform {
//!     field: "value".into(),
//!     op: ScalarOp::Multiply,
//!     factor: 2.0,
//! };
//! registry.create_version("sales", &[double]).await?;
//! registry.rollback("sales", 1).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod checksum;
pub mod dataset;
pub mod error;
pub mod modification;
pub mod partition;
pub mod query;
pub mod record;
pub mod registry;
pub mod store;

pub use backend::{FsBackend, MemoryBackend, StorageBackend, WriteMode};
pub use checksum::{Checksum, ChecksumError};
pub use dataset::{versioned_name, Dataset, VersionEntry, VersionPointer};
pub use error::{StoreError, StoreResult};
pub use modification::{
    apply_pipeline, validate_pipeline, CmpOp, GroupedPartial, Modification, Predicate, ReduceOp,
    Reducer, ScalarOp,
};
pub use partition::Partition;
pub use query::{Query, QueryConfig, QueryEngine, QueryResult, QueryTiming};
pub use record::{FieldValue, Record};
pub use registry::VersionRegistry;
pub use store::{PartitionStore, StoreConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        CmpOp, Dataset, FieldValue, Modification, PartitionStore, Predicate, Query, QueryEngine,
        Record, ReduceOp, Reducer, ScalarOp, StoreConfig, StoreError, StoreResult, VersionRegistry,
    };
}
