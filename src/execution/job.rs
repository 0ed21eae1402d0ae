//! Job Execution
//!
//! One script invocation from dispatch to terminal outcome: register a
//! callback token, dispatch, record the `Triggered` audit entry, wait for
//! the callback and record the terminal status. Both stage runners go
//! through [`run_job`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::callback::{CallbackChannel, CallbackToken, JobOutcome};
use super::executor::{result_log_location, DispatchCommand, DispatchHandle, RemoteExecutor};
use crate::audit::{AuditStore, JobRecord, JobRecordUpdate, JobStatus};
use crate::error::CallbackError;
use crate::monitoring::{EventType, ExecutionTimeline};

/// Terminal result of one job, as seen by the stage runner.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_handle: Option<DispatchHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobResult {
    pub fn succeeded(job_name: impl Into<String>, dispatch_handle: Option<DispatchHandle>) -> Self {
        Self {
            job_name: job_name.into(),
            status: JobStatus::Succeeded,
            dispatch_handle,
            error_message: None,
        }
    }

    pub fn failed(
        job_name: impl Into<String>,
        dispatch_handle: Option<DispatchHandle>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            status: JobStatus::Failed,
            dispatch_handle,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Everything a stage runner needs for one workflow run.
///
/// Cheap to clone; parallel jobs each carry their own copy.
#[derive(Clone)]
pub struct RunContext {
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub executor: Arc<dyn RemoteExecutor>,
    pub channel: Arc<CallbackChannel>,
    pub audit: Arc<dyn AuditStore>,
    pub callback_timeout: Duration,
    pub log_dir: PathBuf,
    pub timeline: Arc<Mutex<ExecutionTimeline>>,
}

impl RunContext {
    fn record(&self, job_name: &str, stage: usize, event_type: EventType) {
        self.timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .add_event(job_name, stage, event_type);
    }

    /// Snapshot of the run's timeline.
    pub fn timeline_snapshot(&self) -> ExecutionTimeline {
        self.timeline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Runs one script to a terminal outcome.
///
/// Never returns an error: dispatch failures, timeouts and cancellation
/// all become failed jobs carrying the reason.
pub async fn run_job(ctx: &RunContext, stage: usize, script: &str) -> JobResult {
    ctx.record(script, stage, EventType::Started);

    let result = dispatch_and_wait(ctx, script).await;

    match &result.error_message {
        None => {
            info!("Job '{}' succeeded", script);
            ctx.record(script, stage, EventType::Completed);
        }
        Some(reason) => {
            error!("Job '{}' failed: {}", script, reason);
            ctx.record(script, stage, EventType::Failed);
        }
    }

    result
}

async fn dispatch_and_wait(ctx: &RunContext, script: &str) -> JobResult {
    let token = match ctx.channel.register(&ctx.workflow_execution_id) {
        Ok(token) => token,
        Err(e) => return JobResult::failed(script, None, outcome_reason(&e)),
    };

    let command = DispatchCommand {
        callback_token: token.clone(),
        workflow_id: ctx.workflow_id.clone(),
        workflow_execution_id: ctx.workflow_execution_id.clone(),
        script: script.to_string(),
        result_log_location: result_log_location(&ctx.log_dir, script),
    };

    let handle = match ctx.executor.dispatch(&command).await {
        Ok(handle) => handle,
        Err(e) => {
            ctx.channel.discard(&token);
            let reason = format!("DispatchError: {}", e);
            let record = JobRecord::dispatch_failed(
                script,
                &ctx.workflow_id,
                &ctx.workflow_execution_id,
                &reason,
            );
            if let Err(audit_err) = ctx.audit.put_job_record(&record).await {
                warn!("Audit write for job '{}' failed: {}", script, audit_err);
            }
            return JobResult::failed(script, None, reason);
        }
    };

    let record = JobRecord::triggered(
        script,
        &ctx.workflow_id,
        &ctx.workflow_execution_id,
        handle.as_str(),
    );
    if let Err(e) = ctx.audit.put_job_record(&record).await {
        warn!("Audit write for job '{}' failed: {}", script, e);
    }

    let outcome = await_outcome(&ctx.channel, &token, ctx.callback_timeout).await;

    let result = match outcome.error_message() {
        None => JobResult::succeeded(script, Some(handle)),
        Some(reason) => JobResult::failed(script, Some(handle), reason),
    };

    let update = JobRecordUpdate::finished(
        script,
        &ctx.workflow_id,
        &ctx.workflow_execution_id,
        result.status,
        result.error_message.clone(),
    );
    if let Err(e) = ctx.audit.update_job_record(&update).await {
        warn!("Audit update for job '{}' failed: {}", script, e);
    }

    result
}

/// Waits for a callback, folding channel errors into a failed outcome.
async fn await_outcome(
    channel: &CallbackChannel,
    token: &CallbackToken,
    timeout: Duration,
) -> JobOutcome {
    match channel.await_completion(token, timeout).await {
        Ok(outcome) => outcome,
        Err(e) => JobOutcome::Failed(outcome_reason(&e)),
    }
}

fn outcome_reason(error: &CallbackError) -> String {
    match error {
        CallbackError::Timeout => "Timeout".to_string(),
        CallbackError::Cancelled(_) => "Cancelled".to_string(),
        other => other.to_string(),
    }
}
