//! Sequential Stage Runner
//!
//! Runs a stage's scripts one at a time. The next script is dispatched
//! only once the previous one has reported success; the first failure
//! ends the stage.

use log::{error, info};

use super::job::{run_job, JobResult, RunContext};

/// Result of a sequential stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SequentialOutcome {
    pub success: bool,
    /// Script that failed, if any
    pub failed_at: Option<String>,
    pub error: Option<String>,
    /// Jobs that ran, in order
    pub jobs: Vec<JobResult>,
}

enum Step {
    Next,
    Run(usize),
    Done,
}

/// Runs `scripts` strictly in order, stopping at the first failure.
pub async fn run_sequential(
    ctx: &RunContext,
    stage_index: usize,
    scripts: &[String],
) -> SequentialOutcome {
    info!(
        "Stage {}: running {} jobs sequentially",
        stage_index,
        scripts.len()
    );

    let mut index: i64 = -1;
    let mut jobs = Vec::with_capacity(scripts.len());
    let mut step = Step::Next;

    loop {
        step = match step {
            Step::Next => {
                index += 1;
                if index as usize >= scripts.len() {
                    Step::Done
                } else {
                    Step::Run(index as usize)
                }
            }
            Step::Run(i) => {
                let result = run_job(ctx, stage_index, &scripts[i]).await;
                let success = result.is_success();
                jobs.push(result);

                if success {
                    Step::Next
                } else {
                    let failed = &jobs[jobs.len() - 1];
                    error!(
                        "Stage {}: stopping at '{}' ({} of {} scripts not run)",
                        stage_index,
                        failed.job_name,
                        scripts.len() - i - 1,
                        scripts.len()
                    );
                    return SequentialOutcome {
                        success: false,
                        failed_at: Some(failed.job_name.clone()),
                        error: failed.error_message.clone(),
                        jobs,
                    };
                }
            }
            Step::Done => break,
        };
    }

    info!("Stage {}: all {} jobs succeeded", stage_index, jobs.len());
    SequentialOutcome {
        success: true,
        failed_at: None,
        error: None,
        jobs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use crate::audit::InMemoryAuditStore;
    use crate::execution::callback::JobOutcome;
    use crate::execution::testing::{Behavior, ScriptedExecutor};
    use crate::monitoring::ExecutionTimeline;

    fn context(executor: &Arc<ScriptedExecutor>) -> RunContext {
        RunContext {
            workflow_id: "wf".into(),
            workflow_execution_id: "run-1".into(),
            executor: executor.clone(),
            channel: executor.channel(),
            audit: Arc::new(InMemoryAuditStore::new()),
            callback_timeout: Duration::from_secs(2),
            log_dir: PathBuf::from("logs"),
            timeline: Arc::new(Mutex::new(ExecutionTimeline::new())),
        }
    }

    fn scripts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let executor = ScriptedExecutor::new();
        let ctx = context(&executor);

        let outcome = run_sequential(&ctx, 1, &scripts(&["a.sql", "b.sql", "c.sql"])).await;

        assert!(outcome.success);
        assert_eq!(outcome.jobs.len(), 3);
        assert_eq!(executor.dispatched(), vec!["a.sql", "b.sql", "c.sql"]);
        assert_eq!(executor.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failure_stops_the_stage() {
        let executor = ScriptedExecutor::new();
        executor.set_behavior("b.sql", Behavior::Fail("Error Code : 3".into()));
        let ctx = context(&executor);

        let outcome = run_sequential(&ctx, 0, &scripts(&["a.sql", "b.sql", "c.sql"])).await;

        assert!(!outcome.success);
        assert_eq!(outcome.failed_at.as_deref(), Some("b.sql"));
        assert_eq!(outcome.error.as_deref(), Some("Error Code : 3"));
        assert_eq!(executor.dispatched(), vec!["a.sql", "b.sql"]);
    }

    #[tokio::test]
    async fn test_next_job_waits_for_callback() {
        let executor = ScriptedExecutor::new();
        executor.set_behavior("a.sql", Behavior::Hold);
        let ctx = context(&executor);

        let stage = scripts(&["a.sql", "b.sql"]);
        let run = tokio::spawn(async move { run_sequential(&ctx, 0, &stage).await });

        assert!(executor.wait_for_dispatches(1, Duration::from_secs(1)).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(executor.dispatched(), vec!["a.sql"]);

        executor.release("a.sql", JobOutcome::Succeeded).unwrap();
        let outcome = run.await.unwrap();
        assert!(outcome.success);
        assert_eq!(executor.dispatched(), vec!["a.sql", "b.sql"]);
    }

    #[tokio::test]
    async fn test_dispatch_rejection_stops_the_stage() {
        let executor = ScriptedExecutor::new();
        executor.set_behavior("a.sql", Behavior::Reject);
        let ctx = context(&executor);

        let outcome = run_sequential(&ctx, 0, &scripts(&["a.sql", "b.sql"])).await;

        assert_eq!(outcome.failed_at.as_deref(), Some("a.sql"));
        assert!(outcome.error.unwrap().starts_with("DispatchError"));
        assert_eq!(executor.dispatched(), vec!["a.sql"]);
    }
}
