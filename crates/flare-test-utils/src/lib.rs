//! Testing utilities for the Flare workspace
//!
//! Small fixtures that keep scenario tests fast: tiny partitions, short load
//! profiles, fixed function timings and a deterministic source corpus.

#![allow(missing_docs)]

use flare_coldstart::SourceUnit;
use flare_scheduler::{FixedCostModel, FunctionType, LoadProfile, SchedulerConfig};
use flare_store::{PartitionStore, QueryConfig, StoreConfig, VersionRegistry};
use std::sync::Arc;
use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

/// Partitions of a few KiB with a handful of rows each
pub fn small_store_config() -> StoreConfig {
    StoreConfig {
        partition_unit_bytes: 64 * KIB,
        nominal_record_bytes: 256,
        max_records_per_partition: 64,
        retry_backoff_ms: 1,
        cache_capacity: 32,
        ..StoreConfig::default()
    }
}

/// No simulated provisioning delay
pub fn instant_query_config() -> QueryConfig {
    QueryConfig {
        provisioning_per_partition_ms: 0,
    }
}

/// In-memory registry over [`small_store_config`]
pub fn memory_registry() -> Arc<VersionRegistry> {
    let store = Arc::new(PartitionStore::in_memory(small_store_config()));
    Arc::new(VersionRegistry::new(store))
}

/// One second of ramp, two of sustain
pub fn short_load_profile(target_rps: u32) -> LoadProfile {
    LoadProfile {
        target_rps,
        ramp_seconds: 1,
        sustain_seconds: 2,
        function_types: FunctionType::ALL.to_vec(),
        payload_bytes: 128,
        success_threshold: 0.95,
        drain_timeout_secs: 5,
    }
}

pub fn scheduler_config(throttle_limit: usize) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_throttle_limit(throttle_limit)
        .with_seed(7)
}

/// Every function takes `cold_ms` to start and `exec_ms` to run
pub fn fixed_cost(cold_ms: u64, exec_ms: u64) -> FixedCostModel {
    FixedCostModel {
        cold_start: Duration::from_millis(cold_ms),
        execution: Duration::from_millis(exec_ms),
    }
}

const DEPENDENCY_SETS: [&[&str]; 8] = [
    &["json", "os"],
    &["requests", "json", "logging"],
    &["psycopg2", "sqlalchemy", "os"],
    &["numpy", "pandas", "boto3", "datetime"],
    &["torch", "transformers", "numpy"],
    &["redis", "uuid"],
    &["sklearn", "numpy", "scipy", "pandas", "joblib"],
    &["pymongo", "boto3", "logging", "hashlib"],
];

const NAME_SUFFIXES: [&str; 4] = ["handler", "service", "worker", "script"];

/// `n` small Python-flavoured functions with varied dependencies
pub fn source_corpus(n: usize) -> Vec<SourceUnit> {
    (0..n)
        .map(|i| {
            let deps = DEPENDENCY_SETS[i % DEPENDENCY_SETS.len()];
            let mut source = String::new();
            for dep in deps {
                source.push_str(&format!("import {dep}\n"));
            }
            source.push_str("\nclass Function:\n");
            source.push_str("    async def handle(self, event):\n");
            for branch in 0..(i % 7) {
                source.push_str(&format!("        if event.get('k{branch}'):\n"));
                source.push_str("            for row in event['rows']:\n");
                source.push_str("                await self.emit(row)\n");
            }
            source.push_str("        return event\n");
            let name = format!("fn_{i:03}_{}", NAME_SUFFIXES[i % NAME_SUFFIXES.len()]);
            let package_mb = 1 + (i as u64 * 7) % 48;
            SourceUnit {
                name,
                source,
                package_bytes: Some(package_mb * MIB),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_corpus_is_deterministic() {
        assert_eq!(source_corpus(12), source_corpus(12));
        assert_eq!(source_corpus(12).len(), 12);
    }

    #[test]
    fn test_fixtures_validate() {
        assert!(small_store_config().validate().is_ok());
        assert!(short_load_profile(20).validate().is_ok());
    }
}
