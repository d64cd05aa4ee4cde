//! Dataset versions and version pointers

use crate::partition::Partition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable version of a dataset family
///
/// Serialized form is the persisted manifest:
/// `{name, version, partitions[...], created_at}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Base (family) name
    pub name: String,
    /// Version number, starting at 1
    pub version: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Partitions in index order
    pub partitions: Vec<Partition>,
}

impl Dataset {
    /// Name of this specific version, `<base>_v<version>`
    #[inline]
    #[must_use]
    pub fn versioned_name(&self) -> String {
        versioned_name(&self.name, self.version)
    }

    /// Number of partitions
    #[inline]
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Sum of partition record counts
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.partitions.iter().map(|p| p.record_count).sum()
    }

    /// Sum of partition byte sizes
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.partitions.iter().map(|p| p.byte_size).sum()
    }

    /// Backend key of this version's manifest
    #[must_use]
    pub fn manifest_key(&self) -> String {
        format!("{}/v{}/manifest.json", self.name, self.version)
    }
}

/// `<base>_v<version>`
#[must_use]
pub fn versioned_name(base: &str, version: u32) -> String {
    format!("{base}_v{version}")
}

/// History entry of a version pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Version number
    pub version: u32,
    /// Versioned dataset name
    pub dataset_name: String,
    /// When the version was created
    pub created_at: DateTime<Utc>,
}

impl VersionEntry {
    /// History entry describing a dataset version
    #[must_use]
    pub fn for_dataset(dataset: &Dataset) -> Self {
        Self {
            version: dataset.version,
            dataset_name: dataset.versioned_name(),
            created_at: dataset.created_at,
        }
    }
}

/// Immutable snapshot of a family's pointer
///
/// The registry never edits a pointer; it swaps in a new snapshot.
/// History is a persistent vector so deriving a snapshot is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPointer {
    /// Base dataset name
    pub name: String,
    /// Version readers resolve to
    pub current_version: u32,
    /// Every version ever created, ordered by version number
    pub history: im::Vector<VersionEntry>,
}

impl VersionPointer {
    /// Pointer for a freshly created family
    #[must_use]
    pub fn initial(dataset: &Dataset) -> Self {
        Self {
            name: dataset.name.clone(),
            current_version: dataset.version,
            history: im::vector![VersionEntry::for_dataset(dataset)],
        }
    }

    /// Snapshot pointing at a new version appended to history
    #[must_use]
    pub fn advanced(&self, dataset: &Dataset) -> Self {
        let mut history = self.history.clone();
        history.push_back(VersionEntry::for_dataset(dataset));
        Self {
            name: self.name.clone(),
            current_version: dataset.version,
            history,
        }
    }

    /// Snapshot recording a version published by a concurrent writer
    ///
    /// History stays ordered by version. The pointer only moves if
    /// `dataset` is newer than every version already recorded, so a slow
    /// writer finishing late never drags `current_version` backwards.
    #[must_use]
    pub fn published(&self, dataset: &Dataset) -> Self {
        let newest = self.history.iter().all(|e| e.version < dataset.version);
        if newest {
            return self.advanced(dataset);
        }
        let mut history = self.history.clone();
        let at = history
            .iter()
            .position(|e| e.version > dataset.version)
            .unwrap_or(history.len());
        history.insert(at, VersionEntry::for_dataset(dataset));
        Self {
            name: self.name.clone(),
            current_version: self.current_version,
            history,
        }
    }

    /// Snapshot pointing at an existing version; history is shared
    #[must_use]
    pub fn rolled_back(&self, version: u32) -> Self {
        Self {
            name: self.name.clone(),
            current_version: version,
            history: self.history.clone(),
        }
    }

    /// True if `version` appears in history
    #[must_use]
    pub fn contains(&self, version: u32) -> bool {
        self.history.iter().any(|e| e.version == version)
    }

    /// Versions in history order
    #[must_use]
    pub fn versions(&self) -> Vec<u32> {
        self.history.iter().map(|e| e.version).collect()
    }

    /// Backend key of a family's pointer
    #[must_use]
    pub fn storage_key(name: &str) -> String {
        format!("{name}/pointer.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(version: u32) -> Dataset {
        Dataset {
            name: "sales".into(),
            version,
            created_at: Utc::now(),
            partitions: vec![],
        }
    }

    #[test]
    fn pointer_advance_and_rollback() {
        let p1 = VersionPointer::initial(&dataset(1));
        let p2 = p1.advanced(&dataset(2));
        assert_eq!(p2.current_version, 2);
        assert_eq!(p2.versions(), vec![1, 2]);

        let back = p2.rolled_back(1);
        assert_eq!(back.current_version, 1);
        assert_eq!(back.history, p2.history);
        // earlier snapshot untouched
        assert_eq!(p1.versions(), vec![1]);
    }

    #[test]
    fn late_publish_keeps_newest_current() {
        let p3 = VersionPointer::initial(&dataset(1)).published(&dataset(3));
        assert_eq!(p3.current_version, 3);

        let late = p3.published(&dataset(2));
        assert_eq!(late.current_version, 3);
        assert_eq!(late.versions(), vec![1, 2, 3]);
    }

    #[test]
    fn versioned_names() {
        assert_eq!(dataset(3).versioned_name(), "sales_v3");
        assert_eq!(dataset(3).manifest_key(), "sales/v3/manifest.json");
        assert_eq!(VersionPointer::storage_key("sales"), "sales/pointer.json");
    }

    #[test]
    fn pointer_serializes_history_as_list() {
        let p = VersionPointer::initial(&dataset(1)).advanced(&dataset(2));
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["current_version"], 2);
        assert_eq!(value["history"].as_array().unwrap().len(), 2);
        assert_eq!(value["history"][1]["dataset_name"], "sales_v2");
    }
}
