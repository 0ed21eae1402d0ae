//! Workflow Run State
//!
//! The in-memory record of one workflow run. The orchestrator owns it
//! exclusively and treats it as the source of truth for the run; audit
//! records are written from it, never read back into it.

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a workflow run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Succeeded,
    Failed,
}

impl WorkflowStatus {
    /// Returns true for Succeeded and Failed.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final, non-reversible outcome of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Succeeded,
    Failed,
}

impl From<TerminalStatus> for WorkflowStatus {
    fn from(status: TerminalStatus) -> Self {
        match status {
            TerminalStatus::Succeeded => Self::Succeeded,
            TerminalStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        WorkflowStatus::from(*self).fmt(f)
    }
}

/// State of a single workflow run.
///
/// `cursor` starts at -1 and only moves forward. Once it passes
/// `total_stage_count` every stage has run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub workflow_execution_id: String,
    cursor: i64,
    total_stage_count: i64,
    status: WorkflowStatus,
    cursor_history: Vec<i64>,
}

impl WorkflowExecution {
    /// Creates the run state for `stage_count` enabled stages.
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_execution_id: impl Into<String>,
        stage_count: usize,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_execution_id: workflow_execution_id.into(),
            cursor: -1,
            total_stage_count: stage_count as i64 - 1,
            status: WorkflowStatus::Running,
            cursor_history: Vec::new(),
        }
    }

    /// Moves the cursor to the next stage.
    ///
    /// Returns the stage index to run, or `None` once all stages are done
    /// (or the run is already terminal).
    pub fn advance(&mut self) -> Option<usize> {
        if self.status.is_terminal() {
            warn!(
                "Ignoring cursor advance on terminal run '{}'",
                self.workflow_execution_id
            );
            return None;
        }

        self.cursor += 1;
        self.cursor_history.push(self.cursor);

        if self.cursor > self.total_stage_count {
            None
        } else {
            Some(self.cursor as usize)
        }
    }

    /// Moves the run to a terminal status.
    ///
    /// Returns false if the run was already terminal; the first terminal
    /// status always stands.
    pub fn finish(&mut self, status: TerminalStatus) -> bool {
        if self.status.is_terminal() {
            warn!(
                "Run '{}' already {}, ignoring {}",
                self.workflow_execution_id, self.status, status
            );
            return false;
        }
        self.status = status.into();
        true
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Index of the last stage; -1 for a run with no stages.
    pub fn total_stage_count(&self) -> i64 {
        self.total_stage_count
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Every cursor value observed, in order.
    pub fn cursor_history(&self) -> &[i64] {
        &self.cursor_history
    }

    /// Number of stages entered so far.
    pub fn stages_started(&self) -> usize {
        (self.cursor.clamp(-1, self.total_stage_count) + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_state() {
        let run = WorkflowExecution::new("wf", "run-1", 3);
        assert_eq!(run.cursor(), -1);
        assert_eq!(run.total_stage_count(), 2);
        assert_eq!(run.status(), WorkflowStatus::Running);
        assert_eq!(run.stages_started(), 0);
    }

    #[test]
    fn test_advance_through_all_stages() {
        let mut run = WorkflowExecution::new("wf", "run-1", 2);
        assert_eq!(run.advance(), Some(0));
        assert_eq!(run.advance(), Some(1));
        assert_eq!(run.advance(), None);
        assert_eq!(run.cursor_history(), &[0, 1, 2]);
        assert_eq!(run.stages_started(), 2);
    }

    #[test]
    fn test_empty_run_finishes_immediately() {
        let mut run = WorkflowExecution::new("wf", "run-1", 0);
        assert_eq!(run.total_stage_count(), -1);
        assert_eq!(run.advance(), None);
        assert_eq!(run.cursor_history(), &[0]);
    }

    #[test]
    fn test_finish_is_final() {
        let mut run = WorkflowExecution::new("wf", "run-1", 1);
        assert!(run.finish(TerminalStatus::Failed));
        assert!(!run.finish(TerminalStatus::Succeeded));
        assert_eq!(run.status(), WorkflowStatus::Failed);
    }

    #[test]
    fn test_no_advance_after_terminal() {
        let mut run = WorkflowExecution::new("wf", "run-1", 3);
        run.advance();
        run.finish(TerminalStatus::Failed);
        assert_eq!(run.advance(), None);
        assert_eq!(run.cursor(), 0);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&WorkflowStatus::Succeeded).unwrap();
        assert_eq!(json, "\"succeeded\"");
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }
}
