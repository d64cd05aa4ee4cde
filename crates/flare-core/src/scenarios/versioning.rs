//! Copy-on-write versioning and rollback

use super::ScratchDataset;
use crate::error::{FlareError, FlareResult};
use crate::registry::Registry;
use flare_store::{apply_pipeline, validate_pipeline, Dataset, Modification, ScalarOp};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Largest accepted `size_mb`
pub(crate) const MAX_SIZE_MB: u64 = 16 * 1024;
/// Largest accepted `min_partitions`
pub(crate) const MAX_PARTITIONS: u32 = 1024;

/// Parameters of `immutability_versioning`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningParams {
    /// Dataset to create; a fresh name is generated when absent
    pub dataset_name: Option<String>,
    /// Nominal dataset size
    pub size_mb: u64,
    /// Lower bound on partitions
    pub min_partitions: u32,
    /// Pipeline producing version 2
    pub modifications: Vec<Modification>,
}

impl Default for VersioningParams {
    fn default() -> Self {
        Self {
            dataset_name: None,
            size_mb: 64,
            min_partitions: 4,
            modifications: vec![Modification::ScalarTransform {
                field: "value".into(),
                op: ScalarOp::Multiply,
                factor: 1.1,
            }],
        }
    }
}

impl VersioningParams {
    pub(crate) fn validate(&self) -> FlareResult<()> {
        if self.size_mb == 0 || self.size_mb > MAX_SIZE_MB {
            return Err(FlareError::invalid(format!(
                "size_mb must be in 1..={MAX_SIZE_MB}, got {}",
                self.size_mb
            )));
        }
        self.target_bytes()?;
        if self.min_partitions == 0 || self.min_partitions > MAX_PARTITIONS {
            return Err(FlareError::invalid(format!(
                "min_partitions must be in 1..={MAX_PARTITIONS}, got {}",
                self.min_partitions
            )));
        }
        validate_pipeline(&self.modifications).map_err(|e| FlareError::invalid(e.to_string()))
    }
}

impl VersioningParams {
    fn target_bytes(&self) -> FlareResult<u64> {
        self.size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| FlareError::invalid("size_mb overflows a byte count"))
    }
}

/// Result of `immutability_versioning`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersioningResult {
    /// Dataset family
    pub dataset: String,
    /// Version created first
    pub original_version: u32,
    /// Version produced by the modifications
    pub modified_version: u32,
    /// Version the pointer was rolled back to
    pub rolled_back_to: u32,
    /// Partitions per version
    pub partitions: usize,
    /// Pointer's current version equals the rollback target
    pub pointer_reflects_rollback: bool,
    /// Original partitions read back byte-identical after rollback
    pub original_data_intact: bool,
    /// Original checksums verify against the bytes read back
    pub checksums_match: bool,
    /// Modified version equals the pipeline applied to the original
    pub modifications_applied: bool,
    /// All four checks hold
    pub passed: bool,
}

async fn read_all_bytes(registry: &Registry, dataset: &Dataset) -> FlareResult<Vec<Vec<u8>>> {
    let mut out = Vec::with_capacity(dataset.partition_count());
    for partition in &dataset.partitions {
        out.push(registry.store().read_partition_bytes(partition).await?);
    }
    Ok(out)
}

/// Run the check; a generated scratch family is dropped afterwards
pub(crate) async fn run(registry: &Registry, params: &VersioningParams) -> FlareResult<VersioningResult> {
    params.validate()?;
    let Some(name) = params.dataset_name.clone() else {
        let scratch = ScratchDataset::new(registry, "versioning");
        let outcome = check(registry, params, scratch.name().to_string()).await;
        scratch.release().await;
        return outcome;
    };
    check(registry, params, name).await
}

async fn check(registry: &Registry, params: &VersioningParams, name: String) -> FlareResult<VersioningResult> {
    let versions = registry.versions();
    let original = versions
        .create_dataset(&name, params.target_bytes()?, params.min_partitions)
        .await?;
    let original_bytes = read_all_bytes(registry, &original).await?;

    let modified = versions.create_version(&name, &params.modifications).await?;
    let mut modifications_applied = modified.partition_count() == original.partition_count();
    for (before, after) in original.partitions.iter().zip(&modified.partitions) {
        let source = registry.store().read_partition(before).await?;
        let stored = registry.store().read_partition(after).await?;
        if apply_pipeline(&params.modifications, &source) != *stored {
            warn!(dataset = %name, partition = %after.id, "modified partition differs from pipeline output");
            modifications_applied = false;
        }
    }

    let pointer = versions.rollback(&name, original.version).await?;
    let pointer_reflects_rollback = pointer.current_version == original.version
        && versions.resolve(&name)?.version == original.version;

    let current = versions.resolve(&name)?;
    let after_bytes = read_all_bytes(registry, &current).await?;
    let original_data_intact = after_bytes == original_bytes;
    let checksums_match = current.partitions.len() == original.partitions.len()
        && current
            .partitions
            .iter()
            .zip(&original.partitions)
            .zip(&after_bytes)
            .all(|((now, then), bytes)| now.checksum == then.checksum && then.checksum.matches(bytes));

    let passed = pointer_reflects_rollback && original_data_intact && checksums_match && modifications_applied;
    info!(
        dataset = %name,
        modified_version = modified.version,
        passed,
        "immutability check finished"
    );
    Ok(VersioningResult {
        dataset: name,
        original_version: original.version,
        modified_version: modified.version,
        rolled_back_to: pointer.current_version,
        partitions: original.partition_count(),
        pointer_reflects_rollback,
        original_data_intact,
        checksums_match,
        modifications_applied,
        passed,
    })
}
