//! Workflow Execution Module
//!
//! Runs staged workflows against a remote executor that reports back
//! asynchronously through callback tokens.
//!
//! # Architecture
//!
//! - [`orchestrator`]: Stage cursor and terminal status of a run
//! - [`parallel`]: Bounded fan-out of a parallel stage
//! - [`sequential`]: One-at-a-time execution of a sequential stage
//! - [`job`]: Dispatch, callback wait and audit of a single script
//! - [`executor`]: Remote executor trait plus shell and dry-run backends
//! - [`callback`]: Token registry pairing dispatches with completions
//! - [`notify`]: Completion notifications from the remote side

pub mod callback;
pub mod executor;
pub mod job;
pub mod notify;
pub mod orchestrator;
pub mod parallel;
pub mod sequential;

#[cfg(test)]
pub(crate) mod testing;

pub use callback::{CallbackChannel, CallbackToken, JobOutcome};
pub use executor::{
    DispatchCommand, DispatchHandle, DryRunExecutor, RemoteExecutor, ShellExecutor,
};
pub use job::{JobResult, RunContext};
pub use notify::{CallbackNotification, CallbackReceiver};
pub use orchestrator::{Orchestrator, RunReport, StageReport};
pub use parallel::ParallelOutcome;
pub use sequential::SequentialOutcome;
