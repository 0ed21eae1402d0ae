//! Workflow Validation
//!
//! Checks a definition before it is handed to the orchestrator:
//! - Workflow identifier present
//! - Script identifiers non-empty
//! - Script identifiers unique across the run (they key job audit records)
//! - Execution modes supported

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{ExecutionMode, WorkflowDefinition};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyWorkflowId,
    EmptyScriptId { stage: usize },
    DuplicateScriptId(String),
    UnsupportedMode { stage: usize, mode: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflowId => write!(f, "Workflow has no workflow_id"),
            Self::EmptyScriptId { stage } => {
                write!(f, "Stage {} has an empty or whitespace-only script name", stage)
            }
            Self::DuplicateScriptId(id) => {
                write!(f, "Script '{}' appears more than once in the workflow", id)
            }
            Self::UnsupportedMode { stage, mode } => {
                write!(f, "Stage {} uses unsupported execution mode '{}'", stage, mode)
            }
        }
    }
}

/// Validates the enabled part of a workflow definition.
///
/// Returns every problem found rather than stopping at the first one.
/// Empty workflows and empty stages are allowed but logged.
pub fn validate_workflow(definition: &WorkflowDefinition) -> Result<(), Vec<ValidationError>> {
    let stage_count = definition.enabled_stages().count();
    info!(
        "Validating workflow '{}' with {} enabled stages",
        definition.workflow_id, stage_count
    );

    let mut errors = Vec::new();

    if definition.workflow_id.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkflowId);
    }

    if stage_count == 0 {
        warn!("Workflow '{}' has no enabled stages", definition.workflow_id);
    }

    let mut seen: HashSet<&str> = HashSet::new();

    for (index, stage) in definition.enabled_stages().enumerate() {
        if let ExecutionMode::Unsupported(mode) = &stage.execution_mode {
            errors.push(ValidationError::UnsupportedMode {
                stage: index,
                mode: mode.clone(),
            });
        }

        if stage.scripts.is_empty() {
            warn!("Stage {} has no scripts and will complete immediately", index);
        }

        for script in &stage.scripts {
            if script.trim().is_empty() {
                errors.push(ValidationError::EmptyScriptId { stage: index });
                continue;
            }
            if !seen.insert(script.as_str()) {
                errors.push(ValidationError::DuplicateScriptId(script.clone()));
            }
        }

        debug!(
            "Stage {}: {} with {} scripts",
            index,
            stage.execution_mode,
            stage.scripts.len()
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
