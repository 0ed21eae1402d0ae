//! Parallel Stage Runner
//!
//! Fans a stage's scripts out to the remote executor at once, bounded by a
//! concurrency cap, and joins on every result before reporting. A failing
//! job never stops its siblings.

use std::sync::Arc;

use log::{error, info};
use tokio::sync::Semaphore;

use super::job::{run_job, JobResult, RunContext};

/// Aggregate result of a parallel stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelOutcome {
    /// True iff every job succeeded
    pub success: bool,
    /// One entry per script, in stage order
    pub per_job_status: Vec<JobResult>,
}

impl ParallelOutcome {
    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.per_job_status.iter().filter(|job| !job.is_success())
    }
}

/// Runs every script of a parallel stage with at most `concurrency_cap`
/// in flight.
pub async fn run_parallel(
    ctx: &RunContext,
    stage_index: usize,
    scripts: &[String],
    concurrency_cap: usize,
) -> ParallelOutcome {
    info!(
        "Stage {}: starting {} jobs in parallel (cap {})",
        stage_index,
        scripts.len(),
        concurrency_cap
    );

    let semaphore = Arc::new(Semaphore::new(concurrency_cap.max(1)));

    let mut handles = Vec::with_capacity(scripts.len());
    for script in scripts {
        let ctx = ctx.clone();
        let job_name = script.clone();
        let semaphore = Arc::clone(&semaphore);

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return JobResult::failed(job_name, None, "concurrency limiter closed"),
            };
            run_job(&ctx, stage_index, &job_name).await
        });
        handles.push((script.clone(), handle));
    }

    let mut per_job_status = Vec::with_capacity(handles.len());
    for (script, handle) in handles {
        match handle.await {
            Ok(result) => per_job_status.push(result),
            Err(e) => {
                error!("Job task for '{}' aborted: {}", script, e);
                per_job_status.push(JobResult::failed(script, None, "job task aborted"));
            }
        }
    }

    let success = per_job_status.iter().all(JobResult::is_success);
    let failed = per_job_status.iter().filter(|job| !job.is_success()).count();
    info!(
        "Stage {}: {} succeeded, {} failed",
        stage_index,
        per_job_status.len() - failed,
        failed
    );

    ParallelOutcome {
        success,
        per_job_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::audit::{InMemoryAuditStore, JobStatus};
    use crate::execution::callback::JobOutcome;
    use crate::execution::testing::{Behavior, ScriptedExecutor};
    use crate::monitoring::ExecutionTimeline;

    fn context(executor: &Arc<ScriptedExecutor>, audit: &Arc<InMemoryAuditStore>) -> RunContext {
        RunContext {
            workflow_id: "wf".into(),
            workflow_execution_id: "run-1".into(),
            executor: executor.clone(),
            channel: executor.channel(),
            audit: audit.clone(),
            callback_timeout: Duration::from_secs(2),
            log_dir: PathBuf::from("logs"),
            timeline: Arc::new(Mutex::new(ExecutionTimeline::new())),
        }
    }

    fn scripts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_all_jobs_dispatched_before_any_callback() {
        let executor = ScriptedExecutor::new();
        for name in ["a.sql", "b.sql", "c.sql"] {
            executor.set_behavior(name, Behavior::Hold);
        }
        let audit = Arc::new(InMemoryAuditStore::new());
        let ctx = context(&executor, &audit);

        let stage = scripts(&["a.sql", "b.sql", "c.sql"]);
        let run = tokio::spawn(async move { run_parallel(&ctx, 0, &stage, 40).await });

        assert!(executor.wait_for_dispatches(3, Duration::from_secs(1)).await);
        for name in ["a.sql", "b.sql", "c.sql"] {
            executor.release(name, JobOutcome::Succeeded).unwrap();
        }

        let outcome = run.await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.per_job_status.len(), 3);
    }

    #[tokio::test]
    async fn test_one_failure_fails_stage_but_siblings_finish() {
        let executor = ScriptedExecutor::new();
        executor.set_behavior("a.sql", Behavior::Fail("Error Code : 7".into()));
        let audit = Arc::new(InMemoryAuditStore::new());
        let ctx = context(&executor, &audit);

        let outcome = run_parallel(&ctx, 0, &scripts(&["a.sql", "b.sql", "c.sql"]), 40).await;

        assert!(!outcome.success);
        let names: Vec<&str> = outcome
            .per_job_status
            .iter()
            .map(|job| job.job_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.sql", "b.sql", "c.sql"]);
        assert_eq!(outcome.failed_jobs().count(), 1);

        assert_eq!(
            audit.job_record("run-1", "b.sql").unwrap().execution_status,
            JobStatus::Succeeded
        );
        assert_eq!(
            audit.job_record("run-1", "c.sql").unwrap().execution_status,
            JobStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let executor = ScriptedExecutor::new();
        let audit = Arc::new(InMemoryAuditStore::new());
        let ctx = context(&executor, &audit);

        let names: Vec<String> = (0..12).map(|i| format!("job_{}.sql", i)).collect();
        let outcome = run_parallel(&ctx, 0, &names, 3).await;

        assert!(outcome.success);
        assert_eq!(executor.dispatched().len(), 12);
        assert!(executor.max_in_flight() <= 3);
    }

    #[tokio::test]
    async fn test_empty_stage_succeeds() {
        let executor = ScriptedExecutor::new();
        let audit = Arc::new(InMemoryAuditStore::new());
        let ctx = context(&executor, &audit);

        let outcome = run_parallel(&ctx, 0, &[], 40).await;
        assert!(outcome.success);
        assert!(outcome.per_job_status.is_empty());
    }
}
