//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, loading and
//! validating staged load workflows, plus the per-run state.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Stage, WorkflowDefinition)
//! - [`parser`]: YAML/JSON loading
//! - [`validator`]: Validation rules
//! - [`state`]: Run state with the stage cursor

pub mod model;
pub mod parser;
pub mod state;
pub mod validator;

pub use model::{ExecutionMode, ScriptId, Stage, WorkflowDefinition};
pub use parser::{load_workflow, parse_workflow};
pub use state::{TerminalStatus, WorkflowExecution, WorkflowStatus};
pub use validator::{validate_workflow, ValidationError};
