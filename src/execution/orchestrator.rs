//! Master Orchestrator
//!
//! Walks the enabled stages of a workflow with a cursor, hands each stage
//! to the parallel or sequential runner and drives the run to a terminal
//! status. The first failing stage ends the run; stages that already
//! completed are not undone.
//!
//! The terminal transition is written to the audit store exactly once. A
//! failed audit write is logged and never changes the computed status.

use std::sync::{Arc, Mutex};

use log::{error, info, warn};
use serde::Serialize;

use super::callback::CallbackChannel;
use super::executor::RemoteExecutor;
use super::job::{JobResult, RunContext};
use super::parallel::{run_parallel, ParallelOutcome};
use super::sequential::{run_sequential, SequentialOutcome};
use crate::audit::{AuditStore, WorkflowRecordUpdate};
use crate::config::Settings;
use crate::error::{ConfigError, OrchestrationError};
use crate::monitoring::ExecutionTimeline;
use crate::workflow::{ExecutionMode, Stage, TerminalStatus, WorkflowDefinition, WorkflowExecution};

/// Outcome of one stage, whichever runner executed it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StageReport {
    pub index: usize,
    pub mode: ExecutionMode,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    pub jobs: Vec<JobResult>,
}

impl StageReport {
    fn from_parallel(index: usize, outcome: ParallelOutcome) -> Self {
        let failed_at = outcome.failed_jobs().next().map(|job| job.job_name.clone());
        Self {
            index,
            mode: ExecutionMode::Parallel,
            success: outcome.success,
            failed_at,
            jobs: outcome.per_job_status,
        }
    }

    fn from_sequential(index: usize, outcome: SequentialOutcome) -> Self {
        Self {
            index,
            mode: ExecutionMode::Sequential,
            success: outcome.success,
            failed_at: outcome.failed_at,
            jobs: outcome.jobs,
        }
    }

    /// Human readable reason for a failed stage.
    fn failure_reason(&self) -> String {
        let failed: Vec<String> = self
            .jobs
            .iter()
            .filter(|job| !job.is_success())
            .map(|job| match &job.error_message {
                Some(message) => format!("{}: {}", job.job_name, message),
                None => job.job_name.clone(),
            })
            .collect();
        failed.join("; ")
    }
}

/// Everything known about a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: TerminalStatus,
    pub execution: WorkflowExecution,
    pub stages: Vec<StageReport>,
    pub failure: Option<OrchestrationError>,
    pub timeline: ExecutionTimeline,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == TerminalStatus::Succeeded
    }

    /// Every job that ran, in stage order.
    pub fn jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.stages.iter().flat_map(|stage| stage.jobs.iter())
    }
}

enum RunState {
    Advance,
    RunStage(usize),
    Finish(TerminalStatus),
}

/// Drives workflow runs against one executor, callback channel and audit
/// store.
pub struct Orchestrator {
    executor: Arc<dyn RemoteExecutor>,
    channel: Arc<CallbackChannel>,
    audit: Arc<dyn AuditStore>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        channel: Arc<CallbackChannel>,
        audit: Arc<dyn AuditStore>,
        settings: Settings,
    ) -> Self {
        Self {
            executor,
            channel,
            audit,
            settings,
        }
    }

    /// The callback channel shared with the notification boundary.
    pub fn channel(&self) -> Arc<CallbackChannel> {
        Arc::clone(&self.channel)
    }

    pub fn audit(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.audit)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs a workflow and returns only its terminal status.
    pub async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        workflow_execution_id: &str,
    ) -> TerminalStatus {
        self.execute(definition, workflow_execution_id).await.status
    }

    /// Runs every enabled stage of `definition` in order.
    ///
    /// The `Running` workflow record is expected to exist already; this
    /// only writes the terminal update.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        workflow_execution_id: &str,
    ) -> RunReport {
        let stages: Vec<&Stage> = definition.enabled_stages().collect();
        let mut run = WorkflowExecution::new(
            &definition.workflow_id,
            workflow_execution_id,
            stages.len(),
        );

        if stages.is_empty() {
            warn!(
                "Workflow '{}' has no enabled stages, nothing to run",
                definition.workflow_id
            );
        }

        let ctx = RunContext {
            workflow_id: definition.workflow_id.clone(),
            workflow_execution_id: workflow_execution_id.to_string(),
            executor: Arc::clone(&self.executor),
            channel: Arc::clone(&self.channel),
            audit: Arc::clone(&self.audit),
            callback_timeout: self.settings.callback_timeout(),
            log_dir: self.settings.log_dir.clone(),
            timeline: Arc::new(Mutex::new(ExecutionTimeline::new())),
        };

        info!(
            "Starting run '{}' of workflow '{}' ({} stages)",
            workflow_execution_id,
            definition.workflow_id,
            stages.len()
        );

        let mut reports = Vec::with_capacity(stages.len());
        let mut failure = None;
        let mut state = RunState::Advance;

        let status = loop {
            state = match state {
                RunState::Advance => match run.advance() {
                    Some(index) => RunState::RunStage(index),
                    None => RunState::Finish(TerminalStatus::Succeeded),
                },
                RunState::RunStage(index) => {
                    match self.run_stage(&ctx, index, stages[index]).await {
                        Ok(report) if report.success => {
                            reports.push(report);
                            RunState::Advance
                        }
                        Ok(report) => {
                            let reason = report.failure_reason();
                            error!("Stage {} failed: {}", index, reason);
                            failure = Some(OrchestrationError::StageFailed { index, reason });
                            reports.push(report);
                            RunState::Finish(TerminalStatus::Failed)
                        }
                        Err(e) => {
                            error!("Stage {} cannot run: {}", index, e);
                            failure = Some(e);
                            RunState::Finish(TerminalStatus::Failed)
                        }
                    }
                }
                RunState::Finish(status) => break status,
            };
        };

        run.finish(status);
        self.record_terminal(&run).await;
        self.channel.release_execution(workflow_execution_id);

        info!(
            "Run '{}' finished: {} ({} of {} stages entered)",
            workflow_execution_id,
            status,
            run.stages_started(),
            stages.len()
        );

        RunReport {
            status,
            execution: run,
            stages: reports,
            failure,
            timeline: ctx.timeline_snapshot(),
        }
    }

    async fn run_stage(
        &self,
        ctx: &RunContext,
        index: usize,
        stage: &Stage,
    ) -> Result<StageReport, OrchestrationError> {
        match &stage.execution_mode {
            ExecutionMode::Parallel => {
                let outcome =
                    run_parallel(ctx, index, &stage.scripts, self.settings.concurrency_cap).await;
                Ok(StageReport::from_parallel(index, outcome))
            }
            ExecutionMode::Sequential => {
                let outcome = run_sequential(ctx, index, &stage.scripts).await;
                Ok(StageReport::from_sequential(index, outcome))
            }
            ExecutionMode::Unsupported(mode) => {
                Err(ConfigError::UnsupportedMode(mode.clone()).into())
            }
        }
    }

    async fn record_terminal(&self, run: &WorkflowExecution) {
        let update = WorkflowRecordUpdate::finished(
            &run.workflow_id,
            &run.workflow_execution_id,
            run.status(),
        );
        if let Err(e) = self.audit.update_workflow_record(&update).await {
            warn!(
                "Failed to record {} for run '{}': {}",
                run.status(),
                run.workflow_execution_id,
                e
            );
        }
    }
}
