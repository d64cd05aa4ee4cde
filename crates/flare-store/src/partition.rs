//! Partition metadata and encoding
//!
//! A partition is written exactly once. Its metadata (locator, size,
//! record count, checksum) is fixed at write time and is what manifests
//! persist.

use crate::checksum::Checksum;
use crate::error::StoreResult;
use crate::record::Record;
use serde::{Deserialize, Serialize};

/// Metadata of one immutable shard of a dataset version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Identifier, `<base>_v<version>_p<index>`
    pub id: String,
    /// Position within the dataset version
    pub index: u32,
    /// Backend key the bytes live under
    pub locator: String,
    /// Number of records
    pub record_count: u64,
    /// Serialized size in bytes
    pub byte_size: u64,
    /// BLAKE3 digest of the serialized bytes
    pub checksum: Checksum,
}

impl Partition {
    /// Identifier for a partition slot
    #[must_use]
    pub fn make_id(base: &str, version: u32, index: u32) -> String {
        format!("{base}_v{version}_p{index:05}")
    }

    /// Backend key for a partition slot
    #[must_use]
    pub fn make_locator(base: &str, version: u32, index: u32) -> String {
        format!("{base}/v{version}/part-{index:05}.json")
    }
}

/// Encoded partition ready to be written
#[derive(Debug, Clone)]
pub struct EncodedPartition {
    /// Metadata the partition will carry once written
    pub meta: Partition,
    /// Serialized records
    pub bytes: Vec<u8>,
}

impl EncodedPartition {
    /// Serialize records for a partition slot
    ///
    /// # Errors
    /// Returns error if the records cannot be serialized
    pub fn encode(base: &str, version: u32, index: u32, records: &[Record]) -> StoreResult<Self> {
        let bytes = serde_json::to_vec(records)?;
        let meta = Partition {
            id: Partition::make_id(base, version, index),
            index,
            locator: Partition::make_locator(base, version, index),
            record_count: records.len() as u64,
            byte_size: bytes.len() as u64,
            checksum: Checksum::compute(&bytes),
        };
        Ok(Self { meta, bytes })
    }
}

/// Decode a partition's bytes back into records
///
/// # Errors
/// Returns error if the bytes are not a JSON record array
pub fn decode_records(bytes: &[u8]) -> StoreResult<Vec<Record>> {
    Ok(serde_json::from_slice(bytes)?)
}
