//! Snapshot-isolated aggregation queries
//!
//! A query resolves the dataset pointer exactly once; a rollback or a new
//! version landing while the query runs does not change what it reads.

use crate::dataset::Dataset;
use crate::error::{StoreError, StoreResult};
use crate::modification::{GroupedPartial, Predicate, ReduceOp, Reducer};
use crate::record::Record;
use crate::registry::VersionRegistry;
use futures::future::try_join_all;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Query engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Simulated cost of opening a compute context per partition
    pub provisioning_per_partition_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            provisioning_per_partition_ms: 2,
        }
    }
}

/// Filter, group and reduce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Optional row filter applied before grouping
    pub filter: Option<Predicate>,
    /// Grouping fields; empty means one global group
    pub group_by: Vec<String>,
    /// Output columns
    pub reducers: Vec<Reducer>,
}

impl Default for Query {
    /// Per-category count, sum and mean of `value`
    fn default() -> Self {
        Self {
            filter: None,
            group_by: vec!["category".to_string()],
            reducers: vec![
                Reducer::count(),
                Reducer::new(ReduceOp::Sum, "value"),
                Reducer::new(ReduceOp::Mean, "value"),
            ],
        }
    }
}

impl Query {
    /// Set the row filter
    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    fn validate(&self) -> StoreResult<()> {
        if self.reducers.is_empty() {
            return Err(StoreError::invalid("query requires at least one reducer"));
        }
        if self.group_by.iter().any(String::is_empty) {
            return Err(StoreError::invalid("group_by field must not be empty"));
        }
        Ok(())
    }
}

/// Where a query's time went
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryTiming {
    /// Simulated per-partition context setup
    pub provisioning_ms: f64,
    /// Reading partitions and aggregating
    pub aggregation_ms: f64,
    /// Wall time of the whole call
    pub total_ms: f64,
}

/// Query output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Base dataset name
    pub dataset: String,
    /// Version the pointer resolved to at call start
    pub version: u32,
    /// One row per group, ordered by group key
    pub rows: Vec<Record>,
    /// Partitions read
    pub partitions_scanned: usize,
    /// Rows read
    pub records_scanned: u64,
    /// Rows that passed the filter
    pub records_matched: u64,
    /// Timing breakdown
    pub timing: QueryTiming,
}

/// Executes queries against the current version of a dataset
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: Arc<VersionRegistry>,
    config: QueryConfig,
}

impl QueryEngine {
    /// Create engine over a registry
    #[must_use]
    pub fn new(registry: Arc<VersionRegistry>, config: QueryConfig) -> Self {
        Self { registry, config }
    }

    /// Registry queried
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<VersionRegistry> {
        &self.registry
    }

    /// Aggregate across every partition of the dataset's current version
    ///
    /// # Errors
    /// - `InvalidInput` for a query without reducers
    /// - `DatasetNotFound` for an unknown dataset
    /// - partition read failures
    pub async fn execute_query(&self, dataset_name: &str, query: &Query) -> StoreResult<QueryResult> {
        query.validate()?;
        let started = Instant::now();
        let snapshot = self.registry.resolve(dataset_name)?;

        let provisioning = self.provision(&snapshot).await;

        let aggregation_started = Instant::now();
        let partials = try_join_all(
            snapshot
                .partitions
                .iter()
                .map(|p| self.registry.store().read_partition(p)),
        )
        .await?;

        let query_owned = query.clone();
        let (merged, scanned, matched) = tokio::task::spawn_blocking(move || {
            partials
                .par_iter()
                .map(|records| {
                    let matching: Vec<&Record> = records
                        .iter()
                        .filter(|r| query_owned.filter.as_ref().map_or(true, |f| f.matches(r)))
                        .collect();
                    let partial = GroupedPartial::from_records(
                        matching.iter().copied(),
                        &query_owned.group_by,
                        &query_owned.reducers,
                    );
                    (partial, records.len() as u64, matching.len() as u64)
                })
                .reduce(
                    || (GroupedPartial::default(), 0, 0),
                    |(mut acc, s1, m1), (partial, s2, m2)| {
                        acc.merge(partial);
                        (acc, s1 + s2, m1 + m2)
                    },
                )
        })
        .await?;
        let rows = merged.finish(&query.group_by, &query.reducers);
        let aggregation = aggregation_started.elapsed();

        let result = QueryResult {
            dataset: snapshot.name.clone(),
            version: snapshot.version,
            rows,
            partitions_scanned: snapshot.partition_count(),
            records_scanned: scanned,
            records_matched: matched,
            timing: QueryTiming {
                provisioning_ms: millis(provisioning),
                aggregation_ms: millis(aggregation),
                total_ms: millis(started.elapsed()),
            },
        };
        tracing::debug!(
            dataset = dataset_name,
            version = result.version,
            partitions = result.partitions_scanned,
            total_ms = result.timing.total_ms,
            "query executed"
        );
        Ok(result)
    }

    async fn provision(&self, dataset: &Dataset) -> Duration {
        let started = Instant::now();
        let per_partition = Duration::from_millis(self.config.provisioning_per_partition_ms);
        let partitions = u32::try_from(dataset.partition_count()).unwrap_or(u32::MAX);
        let cost = per_partition.saturating_mul(partitions);
        if !cost.is_zero() {
            tokio::time::sleep(cost).await;
        }
        started.elapsed()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
