//! JSON File Audit Store
//!
//! Persists audit records under a directory:
//!
//! ```text
//! {audit_dir}/{workflow_execution_id}/workflow.json
//! {audit_dir}/{workflow_execution_id}/jobs/{job_name}.json
//! ```
//!
//! Ids and job names are percent-encoded into a single path component, so
//! distinct keys never share a file and no key escapes the audit directory.
//!
//! Each write replaces the whole document through a temporary file and a
//! rename, so readers never observe a partially written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::{AuditStore, JobRecord, JobRecordUpdate, WorkflowRecord, WorkflowRecordUpdate};
use crate::error::AuditError;

/// Audit store writing one pretty-printed JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonFileAuditStore {
    root: PathBuf,
}

impl JsonFileAuditStore {
    /// Creates a store rooted at `root`. Directories are created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn workflow_path(&self, workflow_execution_id: &str) -> Result<PathBuf, AuditError> {
        Ok(self
            .root
            .join(path_component(workflow_execution_id)?)
            .join("workflow.json"))
    }

    fn job_path(&self, workflow_execution_id: &str, job_name: &str) -> Result<PathBuf, AuditError> {
        Ok(self
            .root
            .join(path_component(workflow_execution_id)?)
            .join("jobs")
            .join(format!("{}.json", path_component(job_name)?)))
    }

    /// Reads the workflow record of a run.
    pub async fn read_workflow_record(
        &self,
        workflow_execution_id: &str,
    ) -> Result<WorkflowRecord, AuditError> {
        read_json(&self.workflow_path(workflow_execution_id)?).await
    }

    /// Reads one job record.
    pub async fn read_job_record(
        &self,
        workflow_execution_id: &str,
        job_name: &str,
    ) -> Result<JobRecord, AuditError> {
        read_json(&self.job_path(workflow_execution_id, job_name)?).await
    }
}

/// Encodes an identifier as one path component.
///
/// Percent-encoding is reversible, so two ids never map to the same name.
/// `.` and `..` survive encoding unchanged and are refused.
fn path_component(id: &str) -> Result<String, AuditError> {
    if id.is_empty() || id == "." || id == ".." {
        return Err(AuditError::InvalidKey(id.to_string()));
    }
    Ok(urlencoding::encode(id).into_owned())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AuditError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AuditError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AuditError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;

    debug!("audit: wrote {}", path.display());
    Ok(())
}

#[async_trait]
impl AuditStore for JsonFileAuditStore {
    async fn get_workflow_record(
        &self,
        workflow_execution_id: &str,
    ) -> Result<Option<WorkflowRecord>, AuditError> {
        match read_json(&self.workflow_path(workflow_execution_id)?).await {
            Ok(record) => Ok(Some(record)),
            Err(AuditError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_workflow_record(&self, record: &WorkflowRecord) -> Result<(), AuditError> {
        write_json(&self.workflow_path(&record.workflow_execution_id)?, record).await
    }

    async fn update_workflow_record(
        &self,
        update: &WorkflowRecordUpdate,
    ) -> Result<(), AuditError> {
        let path = self.workflow_path(&update.workflow_execution_id)?;
        let mut record: WorkflowRecord = read_json(&path).await?;
        update.apply_to(&mut record);
        write_json(&path, &record).await
    }

    async fn put_job_record(&self, record: &JobRecord) -> Result<(), AuditError> {
        let path = self.job_path(&record.workflow_execution_id, &record.job_name)?;
        write_json(&path, record).await
    }

    async fn update_job_record(&self, update: &JobRecordUpdate) -> Result<(), AuditError> {
        let path = self.job_path(&update.workflow_execution_id, &update.job_name)?;
        let mut record: JobRecord = read_json(&path).await?;
        update.apply_to(&mut record);
        write_json(&path, &record).await
    }
}
