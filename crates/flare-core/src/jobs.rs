//! Asynchronous test jobs
//!
//! A job is `{id, state, cancel token, result slot}`. It starts `Running`,
//! executes on its own task under a deadline and finishes exactly once:
//! - `Completed` with a result, or `Cancelled` with a partial one
//! - `Failed` with an error message (scenario error, panic or deadline)
//!
//! Waiters get the final report through a oneshot channel each.

use crate::error::{FlareError, FlareResult};
use crate::scenarios::{ScenarioResult, TestKind};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flare_scheduler::CancelToken;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use ulid::Ulid;

/// Unique job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Generate new job ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = FlareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| FlareError::invalid(format!("malformed job id: {s}")))
    }
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Executing
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
    /// Stopped on request
    Cancelled,
}

impl JobStatus {
    /// No further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Snapshot of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Job id
    pub test_id: JobId,
    /// Scenario run by the job
    pub test_type: TestKind,
    /// Lifecycle state
    pub status: JobStatus,
    /// Scenario verdict, once there is a result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    /// Scenario result (partial if cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ScenarioResult>,
    /// Orchestrator-level failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Submission time
    pub started_at: DateTime<Utc>,
    /// Completion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct JobSlot {
    report: ValidationReport,
    waiters: Vec<oneshot::Sender<ValidationReport>>,
}

#[derive(Debug)]
struct Job {
    cancel: CancelToken,
    slot: Mutex<JobSlot>,
}

impl Job {
    fn snapshot(&self) -> ValidationReport {
        self.slot.lock().report.clone()
    }

    /// Record the outcome once and wake every waiter
    fn finish(&self, status: JobStatus, result: Option<ScenarioResult>, error: Option<String>) {
        let (report, waiters) = {
            let mut slot = self.slot.lock();
            if slot.report.status.is_terminal() {
                return;
            }
            slot.report.status = status;
            slot.report.passed = result.as_ref().map(ScenarioResult::passed);
            slot.report.result = result;
            slot.report.error = error;
            slot.report.finished_at = Some(Utc::now());
            (slot.report.clone(), std::mem::take(&mut slot.waiters))
        };
        for waiter in waiters {
            let _ = waiter.send(report.clone());
        }
    }
}

/// In-memory job table
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<Job>>,
    timeout: Duration,
}

impl JobRegistry {
    /// Registry whose jobs fail after `timeout`
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            timeout,
        }
    }

    /// Per-job deadline
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start `work` on its own task; the job is `Running` when this returns
    ///
    /// `work` receives the job's cancel token. Must be called inside a
    /// tokio runtime.
    pub fn submit<F, Fut>(&self, test_type: TestKind, work: F) -> JobId
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = FlareResult<ScenarioResult>> + Send + 'static,
    {
        let id = JobId::new();
        let cancel = CancelToken::new();
        let job = Arc::new(Job {
            cancel: cancel.clone(),
            slot: Mutex::new(JobSlot {
                report: ValidationReport {
                    test_id: id,
                    test_type,
                    status: JobStatus::Running,
                    passed: None,
                    result: None,
                    error: None,
                    started_at: Utc::now(),
                    finished_at: None,
                },
                waiters: Vec::new(),
            }),
        });
        self.jobs.insert(id, Arc::clone(&job));

        let timeout = self.timeout;
        let mut task = tokio::spawn(work(cancel));
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(Ok(result))) => {
                    let status = if job.cancel.is_cancelled() {
                        JobStatus::Cancelled
                    } else {
                        JobStatus::Completed
                    };
                    info!(job = %id, test = %test_type, ?status, passed = result.passed(), "job finished");
                    job.finish(status, Some(result), None);
                }
                Ok(Ok(Err(FlareError::Cancelled))) => {
                    info!(job = %id, test = %test_type, "job cancelled");
                    job.finish(JobStatus::Cancelled, None, Some(FlareError::Cancelled.to_string()));
                }
                Ok(Ok(Err(e))) => {
                    error!(job = %id, test = %test_type, error = %e, "job failed");
                    job.finish(JobStatus::Failed, None, Some(e.to_string()));
                }
                Ok(Err(join)) => {
                    error!(job = %id, test = %test_type, error = %join, "job task aborted");
                    job.finish(JobStatus::Failed, None, Some(FlareError::from(join).to_string()));
                }
                Err(_) => {
                    task.abort();
                    job.cancel.cancel();
                    let e = FlareError::Timeout {
                        what: format!("job {id}"),
                        secs: timeout.as_secs(),
                    };
                    warn!(job = %id, test = %test_type, "job timed out");
                    job.finish(JobStatus::Failed, None, Some(e.to_string()));
                }
            }
        });

        info!(job = %id, test = %test_type, "job submitted");
        id
    }

    /// Current snapshot
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<ValidationReport> {
        self.jobs.get(&id).map(|job| job.snapshot())
    }

    /// Request cooperative cancellation
    ///
    /// Cancelling a finished job is a no-op.
    ///
    /// # Errors
    /// `JobNotFound` for an unknown id
    pub fn cancel(&self, id: JobId) -> FlareResult<()> {
        let job = self.jobs.get(&id).ok_or(FlareError::JobNotFound(id))?;
        job.cancel.cancel();
        info!(job = %id, "job cancellation requested");
        Ok(())
    }

    /// Every job, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<ValidationReport> {
        let mut reports: Vec<ValidationReport> = self.jobs.iter().map(|job| job.snapshot()).collect();
        reports.sort_by_key(|r| r.test_id);
        reports
    }

    /// Wait for the job to finish
    ///
    /// # Errors
    /// `JobNotFound` for an unknown id
    pub async fn wait(&self, id: JobId) -> FlareResult<ValidationReport> {
        let job = self
            .jobs
            .get(&id)
            .map(|j| Arc::clone(j.value()))
            .ok_or(FlareError::JobNotFound(id))?;
        let rx = {
            let mut slot = job.slot.lock();
            if slot.report.status.is_terminal() {
                return Ok(slot.report.clone());
            }
            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);
            rx
        };
        rx.await
            .map_err(|_| FlareError::Internal(format!("job {id} dropped its completion channel")))
    }

    /// Number of jobs recorded
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// No jobs recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::VersioningResult;

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult::ImmutabilityVersioning(VersioningResult {
            dataset: "d".into(),
            original_version: 1,
            modified_version: 2,
            rolled_back_to: 1,
            partitions: 4,
            pointer_reflects_rollback: passed,
            original_data_intact: passed,
            checksums_match: passed,
            modifications_applied: passed,
            passed,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn completes_with_result() {
        let jobs = JobRegistry::new(Duration::from_secs(60));
        let id = jobs.submit(TestKind::ImmutabilityVersioning, |_| async { Ok(sample_result(true)) });
        assert_eq!(jobs.get(id).unwrap().status, JobStatus::Running);

        let report = jobs.wait(id).await.unwrap();
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.passed, Some(true));
        assert!(report.finished_at.is_some());
        assert_eq!(jobs.get(id).unwrap(), report);
    }

    #[tokio::test(start_paused = true)]
    async fn error_marks_failed() {
        let jobs = JobRegistry::new(Duration::from_secs(60));
        let id = jobs.submit(TestKind::MassiveQuery, |_| async {
            Err(FlareError::invalid("size_gb must be positive"))
        });
        let report = jobs.wait(id).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.error.unwrap().contains("size_gb"));
        assert!(report.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_the_job() {
        let jobs = JobRegistry::new(Duration::from_secs(5));
        let id = jobs.submit(TestKind::FireworksStorm, |_| async {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(sample_result(true))
        });
        let report = jobs.wait(id).await.unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.error.unwrap().contains("timed out after 5s"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_partial_result() {
        let jobs = JobRegistry::new(Duration::from_secs(60));
        let id = jobs.submit(TestKind::FireworksStorm, |cancel| async move {
            cancel.cancelled().await;
            Ok(sample_result(false))
        });
        jobs.cancel(id).unwrap();
        let report = jobs.wait(id).await.unwrap();
        assert_eq!(report.status, JobStatus::Cancelled);
        assert_eq!(report.passed, Some(false));
    }

    #[tokio::test]
    async fn unknown_job() {
        let jobs = JobRegistry::new(Duration::from_secs(1));
        let id = JobId::new();
        assert!(jobs.get(id).is_none());
        assert!(matches!(jobs.cancel(id), Err(FlareError::JobNotFound(_))));
        assert!(matches!(jobs.wait(id).await, Err(FlareError::JobNotFound(_))));
    }

    #[test]
    fn job_id_parses_back() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-ulid".parse::<JobId>().is_err());
    }
}
