//! Loadflow - Staged Data-Load Workflow Orchestrator
//!
//! Runs multi-stage data-load workflows against a remote execution target
//! that reports completion asynchronously. Each stage runs its scripts
//! either in parallel (bounded fan-out) or sequentially, and the first
//! failing stage ends the run.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Workflow definitions, loading, validation and run state
//! - [`execution`]: Orchestrator, stage runners, remote executors and callbacks
//! - [`audit`]: Audit store contract and its in-memory and file backends
//! - [`trigger`]: Starting, waiting on and aborting runs
//! - [`monitoring`]: Per-job execution timeline
//! - [`config`]: Deployment settings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use loadflow::audit::InMemoryAuditStore;
//! use loadflow::execution::{CallbackChannel, CallbackReceiver, Orchestrator, ShellExecutor};
//! use loadflow::trigger::{Launcher, TriggerRequest};
//! use loadflow::{load_workflow, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::default();
//!     let workflow = load_workflow("nightly_load.yaml")?;
//!
//!     let channel = Arc::new(CallbackChannel::new());
//!     let executor = ShellExecutor::new(
//!         &settings.scripts_dir,
//!         CallbackReceiver::new(Arc::clone(&channel)),
//!     );
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(executor),
//!         channel,
//!         Arc::new(InMemoryAuditStore::new()),
//!         settings,
//!     );
//!
//!     let launcher = Launcher::new(Arc::new(orchestrator));
//!     let handle = launcher.start(TriggerRequest::new(workflow, "run-001")).await?;
//!     let report = handle.wait().await?;
//!     println!("{}", report.status);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod trigger;
pub mod workflow;

// Re-export commonly used types
pub use config::Settings;
pub use execution::{Orchestrator, RunReport};
pub use trigger::{Launcher, RunHandle, TriggerRequest};
pub use workflow::model::{ExecutionMode, Stage, WorkflowDefinition};
pub use workflow::parser::load_workflow;
pub use workflow::state::TerminalStatus;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Loadflow";
