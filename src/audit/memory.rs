//! In-memory audit store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use log::debug;

use super::{AuditStore, JobRecord, JobRecordUpdate, WorkflowRecord, WorkflowRecordUpdate};
use crate::error::AuditError;

#[derive(Default)]
struct Tables {
    workflows: HashMap<String, WorkflowRecord>,
    jobs: HashMap<(String, String), JobRecord>,
}

/// Audit store kept in process memory.
#[derive(Default)]
pub struct InMemoryAuditStore {
    tables: Mutex<Tables>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the workflow record for a run, if any.
    pub fn workflow_record(&self, workflow_execution_id: &str) -> Option<WorkflowRecord> {
        self.tables().workflows.get(workflow_execution_id).cloned()
    }

    /// Returns one job record.
    pub fn job_record(&self, workflow_execution_id: &str, job_name: &str) -> Option<JobRecord> {
        self.tables()
            .jobs
            .get(&(workflow_execution_id.to_string(), job_name.to_string()))
            .cloned()
    }

    /// Returns all job records of a run, sorted by job name.
    pub fn job_records(&self, workflow_execution_id: &str) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .tables()
            .jobs
            .values()
            .filter(|record| record.workflow_execution_id == workflow_execution_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        records
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn get_workflow_record(
        &self,
        workflow_execution_id: &str,
    ) -> Result<Option<WorkflowRecord>, AuditError> {
        Ok(self.workflow_record(workflow_execution_id))
    }

    async fn put_workflow_record(&self, record: &WorkflowRecord) -> Result<(), AuditError> {
        debug!("audit: put workflow {}", record.workflow_execution_id);
        self.tables()
            .workflows
            .insert(record.workflow_execution_id.clone(), record.clone());
        Ok(())
    }

    async fn update_workflow_record(
        &self,
        update: &WorkflowRecordUpdate,
    ) -> Result<(), AuditError> {
        debug!(
            "audit: update workflow {} -> {}",
            update.workflow_execution_id, update.execution_status
        );
        let mut tables = self.tables();
        let record = tables
            .workflows
            .get_mut(&update.workflow_execution_id)
            .ok_or_else(|| AuditError::NotFound(update.workflow_execution_id.clone()))?;
        update.apply_to(record);
        Ok(())
    }

    async fn put_job_record(&self, record: &JobRecord) -> Result<(), AuditError> {
        debug!(
            "audit: put job {}/{}",
            record.workflow_execution_id, record.job_name
        );
        let key = (record.workflow_execution_id.clone(), record.job_name.clone());
        self.tables().jobs.insert(key, record.clone());
        Ok(())
    }

    async fn update_job_record(&self, update: &JobRecordUpdate) -> Result<(), AuditError> {
        debug!(
            "audit: update job {}/{} -> {}",
            update.workflow_execution_id, update.job_name, update.execution_status
        );
        let key = (update.workflow_execution_id.clone(), update.job_name.clone());
        let mut tables = self.tables();
        let record = tables
            .jobs
            .get_mut(&key)
            .ok_or_else(|| AuditError::NotFound(format!("{}/{}", key.0, key.1)))?;
        update.apply_to(record);
        Ok(())
    }
}
