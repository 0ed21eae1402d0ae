//! Audit Store
//!
//! The persistence contract the orchestrator writes its audit trail
//! through. Every call carries the full addressing context of the record
//! it touches, and every write is last-write-wins so retries are harmless.
//!
//! # Components
//!
//! - [`AuditStore`]: the async trait the orchestration core depends on
//! - [`InMemoryAuditStore`]: process-local store for tests and dry runs
//! - [`JsonFileAuditStore`]: one JSON document per record on disk

pub mod file;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::workflow::WorkflowStatus;

pub use file::JsonFileAuditStore;
pub use memory::InMemoryAuditStore;

/// Status of one script invocation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Triggered,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Triggered)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triggered => write!(f, "triggered"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Workflow-level audit record, keyed by `workflow_execution_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub workflow_id: String,
    pub workflow_execution_id: String,
    /// Every job the run is expected to execute
    pub jobs: Vec<String>,
    pub execution_status: WorkflowStatus,
    pub execution_start_ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_end_ts: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    /// A fresh `Running` record started now.
    pub fn running(
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        jobs: Vec<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            jobs,
            execution_status: WorkflowStatus::Running,
            execution_start_ts: Utc::now(),
            execution_end_ts: None,
        }
    }
}

/// Partial update of a workflow record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowRecordUpdate {
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub execution_status: WorkflowStatus,
    pub execution_end_ts: Option<DateTime<Utc>>,
}

impl WorkflowRecordUpdate {
    /// Terminal update stamped now.
    pub fn finished(
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        status: WorkflowStatus,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            execution_status: status,
            execution_end_ts: Some(Utc::now()),
        }
    }

    /// Applies this update to a stored record.
    pub fn apply_to(&self, record: &mut WorkflowRecord) {
        record.workflow_id = self.workflow_id.clone();
        record.execution_status = self.execution_status;
        if self.execution_end_ts.is_some() {
            record.execution_end_ts = self.execution_end_ts;
        }
    }
}

/// Job-level audit record, keyed by `(workflow_execution_id, job_name)`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_name: String,
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub execution_status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_handle: Option<String>,
    pub execution_start_ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_end_ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecord {
    /// Record written right after a successful dispatch.
    pub fn triggered(
        job_name: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        dispatch_handle: impl Into<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            execution_status: JobStatus::Triggered,
            dispatch_handle: Some(dispatch_handle.into()),
            execution_start_ts: Utc::now(),
            execution_end_ts: None,
            error_message: None,
        }
    }

    /// Record for a job the remote side never accepted.
    pub fn dispatch_failed(
        job_name: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_name: job_name.into(),
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            execution_status: JobStatus::Failed,
            dispatch_handle: None,
            execution_start_ts: now,
            execution_end_ts: Some(now),
            error_message: Some(error_message.into()),
        }
    }
}

/// Partial update of a job record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JobRecordUpdate {
    pub job_name: String,
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub execution_status: JobStatus,
    pub execution_end_ts: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl JobRecordUpdate {
    /// Terminal update stamped now.
    pub fn finished(
        job_name: impl Into<String>,
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            execution_status: status,
            execution_end_ts: Some(Utc::now()),
            error_message,
        }
    }

    /// Applies this update to a stored record.
    pub fn apply_to(&self, record: &mut JobRecord) {
        record.workflow_id = self.workflow_id.clone();
        record.execution_status = self.execution_status;
        if self.execution_end_ts.is_some() {
            record.execution_end_ts = self.execution_end_ts;
        }
        if self.error_message.is_some() {
            record.error_message = self.error_message.clone();
        }
    }
}

/// Persistence contract for workflow and job audit records.
///
/// Implementations must be idempotent under retry: writing the same put
/// or update twice leaves the same observable state.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Looks up the workflow record of a run.
    async fn get_workflow_record(
        &self,
        workflow_execution_id: &str,
    ) -> Result<Option<WorkflowRecord>, AuditError>;

    /// Creates or replaces a workflow record.
    async fn put_workflow_record(&self, record: &WorkflowRecord) -> Result<(), AuditError>;

    /// Merges an update into an existing workflow record.
    async fn update_workflow_record(&self, update: &WorkflowRecordUpdate)
        -> Result<(), AuditError>;

    /// Creates or replaces a job record.
    async fn put_job_record(&self, record: &JobRecord) -> Result<(), AuditError>;

    /// Merges an update into an existing job record.
    async fn update_job_record(&self, update: &JobRecordUpdate) -> Result<(), AuditError>;
}
