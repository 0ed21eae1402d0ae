//! Workflow Trigger
//!
//! Entry point for starting runs. A trigger carries the workflow id, a
//! unique execution id and the stage list; the launcher records the run as
//! `Running` and hands it to the orchestrator on its own task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::audit::WorkflowRecord;
use crate::error::{OrchestrationError, TriggerError};
use crate::execution::{CallbackChannel, Orchestrator, RunReport};
use crate::workflow::{validate_workflow, Stage, ValidationError, WorkflowDefinition};

/// Request to start one orchestration run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub stage_details: Vec<Stage>,
}

impl TriggerRequest {
    pub fn new(definition: WorkflowDefinition, workflow_execution_id: impl Into<String>) -> Self {
        Self {
            workflow_id: definition.workflow_id,
            workflow_execution_id: workflow_execution_id.into(),
            stage_details: definition.stages,
        }
    }

    /// The enabled part of the requested workflow.
    fn definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            workflow_id: self.workflow_id.clone(),
            stages: self.stage_details.clone(),
        }
        .enabled_only()
    }
}

/// Execution ids seen by a launcher.
#[derive(Default)]
struct ExecutionIds {
    running: HashSet<String>,
    /// Every id whose `Running` record was written
    started: HashSet<String>,
}

type SharedIds = Arc<Mutex<ExecutionIds>>;

fn lock(ids: &SharedIds) -> MutexGuard<'_, ExecutionIds> {
    ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frees the execution id when the run task ends, however it ends.
///
/// The cancellation marker is cleared under the same lock a canceller
/// checks, so a cancel racing the end of the run cannot leave one behind.
struct RunningGuard {
    ids: SharedIds,
    channel: Arc<CallbackChannel>,
    workflow_execution_id: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut ids = lock(&self.ids);
        ids.running.remove(&self.workflow_execution_id);
        self.channel.release_execution(&self.workflow_execution_id);
    }
}

/// Starts runs and keeps execution ids unique: an id is never reused,
/// whether its earlier run is still active, finished in this process, or
/// already has a record in the audit store.
pub struct Launcher {
    orchestrator: Arc<Orchestrator>,
    ids: SharedIds,
}

impl Launcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            ids: SharedIds::default(),
        }
    }

    /// Whether a run with this id is currently active.
    pub fn is_running(&self, workflow_execution_id: &str) -> bool {
        lock(&self.ids).running.contains(workflow_execution_id)
    }

    /// Records the run as started and spawns its orchestration task.
    pub async fn start(&self, request: TriggerRequest) -> Result<RunHandle, TriggerError> {
        let id = request.workflow_execution_id.trim().to_string();
        if id.is_empty() {
            return Err(TriggerError::EmptyExecutionId);
        }

        let definition = request.definition();
        check_definition(&definition)?;

        {
            let mut ids = lock(&self.ids);
            if ids.running.contains(&id) {
                return Err(TriggerError::AlreadyRunning(id));
            }
            if ids.started.contains(&id) {
                return Err(TriggerError::AlreadyExists(id));
            }
            ids.running.insert(id.clone());
        }
        // Dropping the guard on the error paths below frees the id again.
        let guard = RunningGuard {
            ids: Arc::clone(&self.ids),
            channel: self.orchestrator.channel(),
            workflow_execution_id: id.clone(),
        };

        let audit = self.orchestrator.audit();
        if audit.get_workflow_record(&id).await?.is_some() {
            warn!("Execution id '{}' already has an audit record", id);
            return Err(TriggerError::AlreadyExists(id));
        }

        let record = WorkflowRecord::running(&definition.workflow_id, &id, definition.job_names());
        audit.put_workflow_record(&record).await?;
        lock(&self.ids).started.insert(id.clone());

        info!(
            "Triggered run '{}' of workflow '{}'",
            id, definition.workflow_id
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let run_id = id.clone();
        let join = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.execute(&definition, &run_id).await
        });

        Ok(RunHandle {
            canceller: RunCanceller {
                channel: self.orchestrator.channel(),
                ids: Arc::clone(&self.ids),
                workflow_execution_id: id.clone(),
            },
            workflow_execution_id: id,
            join,
        })
    }
}

/// Rejects definitions that cannot be audited consistently.
///
/// Unsupported stage modes pass; the run itself fails on reaching them.
fn check_definition(definition: &WorkflowDefinition) -> Result<(), TriggerError> {
    let Err(errors) = validate_workflow(definition) else {
        return Ok(());
    };

    let blocking: Vec<String> = errors
        .iter()
        .filter(|e| !matches!(e, ValidationError::UnsupportedMode { .. }))
        .map(ToString::to_string)
        .collect();

    if blocking.is_empty() {
        Ok(())
    } else {
        Err(TriggerError::InvalidWorkflow(blocking.join("; ")))
    }
}

/// Stops orchestrating a run. Jobs already dispatched keep running on the
/// remote side.
#[derive(Clone)]
pub struct RunCanceller {
    channel: Arc<CallbackChannel>,
    ids: SharedIds,
    workflow_execution_id: String,
}

impl RunCanceller {
    /// Releases every pending wait of the run with `Cancelled`.
    pub fn cancel(&self) {
        let ids = lock(&self.ids);
        if !ids.running.contains(&self.workflow_execution_id) {
            warn!(
                "Run '{}' is not active, nothing to cancel",
                self.workflow_execution_id
            );
            return;
        }
        self.channel.cancel_execution(&self.workflow_execution_id);
    }
}

/// Handle to a started run.
pub struct RunHandle {
    pub workflow_execution_id: String,
    join: JoinHandle<RunReport>,
    canceller: RunCanceller,
}

impl RunHandle {
    pub fn canceller(&self) -> RunCanceller {
        self.canceller.clone()
    }

    /// Aborts the run; it ends as Failed once its pending waits unwind.
    pub fn abort(&self) {
        self.canceller.cancel();
    }

    /// Waits for the run to reach its terminal status.
    pub async fn wait(self) -> Result<RunReport, OrchestrationError> {
        self.join
            .await
            .map_err(|e| OrchestrationError::Aborted(e.to_string()))
    }
}
