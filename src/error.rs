//! Error Types
//!
//! One error enum per concern. Job-level failures (dispatch errors,
//! callback timeouts, cancellation) are folded into job outcomes by the
//! stage runners; only configuration and trigger errors stop a run from
//! the outside.

use thiserror::Error;

/// Invalid workflow definition or deployment settings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("failed to read '{path}': {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("unsupported execution mode '{0}' (expected 'parallel' or 'sequential')")]
    UnsupportedMode(String),

    #[error("invalid workflow: {0}")]
    Invalid(String),

    #[error("invalid setting {key}: {reason}")]
    InvalidSetting { key: String, reason: String },
}

/// The remote target was unreachable or rejected the command.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("script '{0}' not found")]
    ScriptNotFound(String),

    #[error("remote target unreachable: {0}")]
    Unreachable(String),

    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Callback channel failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallbackError {
    #[error("no callback received before timeout")]
    Timeout,

    #[error("unknown or already resolved callback token '{0}'")]
    UnknownOrDuplicateToken(String),

    #[error("workflow execution '{0}' was cancelled")]
    Cancelled(String),
}

/// Audit persistence failures. Never override a computed terminal status.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit record not found: {0}")]
    NotFound(String),

    #[error("invalid audit key '{0}'")]
    InvalidKey(String),

    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("audit backend error: {0}")]
    Backend(String),
}

/// Errors raised by the workflow trigger boundary.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("workflow execution id must not be empty")]
    EmptyExecutionId,

    #[error("workflow execution '{0}' is already running")]
    AlreadyRunning(String),

    #[error("workflow execution id '{0}' was already used")]
    AlreadyExists(String),

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("could not record workflow start: {0}")]
    Audit(#[from] AuditError),
}

/// Fatal orchestration failures that terminate a run as Failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OrchestrationError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("stage {index} failed: {reason}")]
    StageFailed { index: usize, reason: String },

    #[error("run panicked or was aborted: {0}")]
    Aborted(String),
}
