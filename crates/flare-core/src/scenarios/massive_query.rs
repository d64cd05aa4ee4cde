//! Concurrent aggregation over a large dataset

use super::ScratchDataset;
use crate::config::FlareConfig;
use crate::error::{FlareError, FlareResult};
use crate::registry::Registry;
use flare_scheduler::{CancelToken, LatencySummary};
use flare_store::Query;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Largest accepted `size_gb`
pub(crate) const MAX_SIZE_GB: f64 = 16.0;
/// Largest accepted `min_partitions`
pub(crate) const MAX_PARTITIONS: u32 = 1024;
/// Largest accepted `concurrent_queries`
pub(crate) const MAX_CONCURRENT_QUERIES: usize = 1000;

/// Parameters of `massive_query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassiveQueryParams {
    /// Dataset to create; a fresh name is generated when absent
    pub dataset_name: Option<String>,
    /// Nominal dataset size
    pub size_gb: f64,
    /// Lower bound on partitions
    pub min_partitions: u32,
    /// Queries issued at once
    pub concurrent_queries: usize,
    /// Overrides the configured p99 target
    pub p99_target_ms: Option<f64>,
    /// Query every task runs
    pub query: Query,
}

impl Default for MassiveQueryParams {
    fn default() -> Self {
        Self {
            dataset_name: None,
            size_gb: 1.0,
            min_partitions: 16,
            concurrent_queries: 10,
            p99_target_ms: None,
            query: Query::default(),
        }
    }
}

impl MassiveQueryParams {
    pub(crate) fn validate(&self) -> FlareResult<()> {
        if !(self.size_gb > 0.0 && self.size_gb <= MAX_SIZE_GB) {
            return Err(FlareError::invalid(format!(
                "size_gb must be in (0, {MAX_SIZE_GB}], got {}",
                self.size_gb
            )));
        }
        if self.min_partitions == 0 || self.min_partitions > MAX_PARTITIONS {
            return Err(FlareError::invalid(format!(
                "min_partitions must be in 1..={MAX_PARTITIONS}, got {}",
                self.min_partitions
            )));
        }
        if self.concurrent_queries == 0 || self.concurrent_queries > MAX_CONCURRENT_QUERIES {
            return Err(FlareError::invalid(format!(
                "concurrent_queries must be in 1..={MAX_CONCURRENT_QUERIES}, got {}",
                self.concurrent_queries
            )));
        }
        if self.p99_target_ms.is_some_and(|t| !(t > 0.0)) {
            return Err(FlareError::invalid("p99_target_ms must be positive"));
        }
        Ok(())
    }
}

/// Result of `massive_query`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassiveQueryResult {
    /// Dataset queried
    pub dataset: String,
    /// Version every query resolved
    pub version: u32,
    /// Partitions in the dataset
    pub partitions: usize,
    /// Records across all partitions
    pub total_records: u64,
    /// Queries requested
    pub queries_requested: usize,
    /// Queries that returned
    pub queries_completed: usize,
    /// Queries that errored
    pub queries_failed: usize,
    /// Rows in the aggregate of the first successful query
    pub result_rows: usize,
    /// End-to-end latency per query
    pub latency: LatencySummary,
    /// Mean provisioning share of a query
    pub mean_provisioning_ms: f64,
    /// Gate applied to `latency.p99_ms`
    pub p99_target_ms: f64,
    /// First query error, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    /// Run was cancelled before every query returned
    pub cancelled: bool,
    /// Every query succeeded and p99 is under target
    pub passed: bool,
}

/// Run the queries; a generated scratch dataset is dropped afterwards
pub(crate) async fn run(
    registry: &Registry,
    config: &FlareConfig,
    params: &MassiveQueryParams,
    cancel: &CancelToken,
) -> FlareResult<MassiveQueryResult> {
    params.validate()?;
    let Some(name) = params.dataset_name.clone() else {
        let scratch = ScratchDataset::new(registry, "massive_query");
        let outcome = query_dataset(registry, config, params, scratch.name().to_string(), cancel).await;
        scratch.release().await;
        return outcome;
    };
    query_dataset(registry, config, params, name, cancel).await
}

async fn query_dataset(
    registry: &Registry,
    config: &FlareConfig,
    params: &MassiveQueryParams,
    name: String,
    cancel: &CancelToken,
) -> FlareResult<MassiveQueryResult> {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let target_bytes = (params.size_gb * GIB) as u64;
    let dataset = registry
        .versions()
        .create_dataset(&name, target_bytes, params.min_partitions)
        .await?;
    info!(
        dataset = %name,
        partitions = dataset.partition_count(),
        records = dataset.total_records(),
        queries = params.concurrent_queries,
        "massive query dataset ready"
    );

    let mut queries = JoinSet::new();
    for _ in 0..params.concurrent_queries {
        let engine = Arc::clone(registry.queries());
        let query = params.query.clone();
        let name = name.clone();
        queries.spawn(async move {
            let started = Instant::now();
            let result = engine.execute_query(&name, &query).await;
            (started.elapsed(), result)
        });
    }

    let mut latencies = Vec::with_capacity(params.concurrent_queries);
    let mut provisioning = Vec::with_capacity(params.concurrent_queries);
    let (mut failed, mut result_rows, mut first_error, mut cancelled) = (0, None, None, false);
    loop {
        let joined = tokio::select! {
            joined = queries.join_next() => joined,
            () = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                queries.abort_all();
                continue;
            }
        };
        let Some(joined) = joined else { break };
        match joined {
            Ok((elapsed, Ok(result))) => {
                latencies.push(elapsed.as_secs_f64() * 1000.0);
                provisioning.push(result.timing.provisioning_ms);
                result_rows.get_or_insert(result.rows.len());
            }
            Ok((_, Err(e))) => {
                failed += 1;
                warn!(dataset = %name, error = %e, "query failed");
                first_error.get_or_insert_with(|| e.to_string());
            }
            Err(join) if join.is_cancelled() => {}
            Err(join) => {
                failed += 1;
                first_error.get_or_insert_with(|| join.to_string());
            }
        }
    }

    let latency = LatencySummary::from_samples(&latencies);
    let p99_target_ms = params.p99_target_ms.unwrap_or(config.p99_target_ms);
    let passed = !cancelled
        && failed == 0
        && latency.count == params.concurrent_queries
        && latency.p99_ms < p99_target_ms;
    #[allow(clippy::cast_precision_loss)]
    let mean_provisioning_ms = if provisioning.is_empty() {
        0.0
    } else {
        provisioning.iter().sum::<f64>() / provisioning.len() as f64
    };

    info!(dataset = %name, p99_ms = latency.p99_ms, target_ms = p99_target_ms, passed, "massive query finished");
    Ok(MassiveQueryResult {
        dataset: name,
        version: dataset.version,
        partitions: dataset.partition_count(),
        total_records: dataset.total_records(),
        queries_requested: params.concurrent_queries,
        queries_completed: latency.count,
        queries_failed: failed,
        result_rows: result_rows.unwrap_or(0),
        latency,
        mean_provisioning_ms,
        p99_target_ms,
        first_error,
        cancelled,
        passed,
    })
}
