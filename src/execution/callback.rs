//! Callback Channel
//!
//! Matches asynchronous completion notifications to the logical task
//! waiting on them. A token is registered before its job is dispatched,
//! awaited by exactly one task, and resolved at most once.
//!
//! The token map is the only structure shared between concurrent jobs;
//! every operation on it happens under one mutex.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::CallbackError;

/// Opaque correlation id handed to the remote side with each dispatch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CallbackToken(String);

impl CallbackToken {
    /// Mints a fresh random token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallbackToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CallbackToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the remote side reported for a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    /// The run was aborted while the job was pending
    Cancelled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Failure reason, if any.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Succeeded => None,
            Self::Failed(reason) => Some(reason),
            Self::Cancelled => Some("Cancelled"),
        }
    }
}

/// One registered token. `sender` is taken on resolution, `receiver` by
/// the single task awaiting it; the entry goes away once both are gone.
struct Waiter {
    workflow_execution_id: String,
    sender: Option<oneshot::Sender<JobOutcome>>,
    receiver: Option<oneshot::Receiver<JobOutcome>>,
}

#[derive(Default)]
struct Registry {
    waiters: HashMap<CallbackToken, Waiter>,
    cancelled: HashSet<String>,
}

/// Token to waiter map shared by the stage runners and the callback boundary.
#[derive(Default)]
pub struct CallbackChannel {
    registry: Mutex<Registry>,
}

impl CallbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mints a token and creates its pending wait.
    ///
    /// Fails if the run has been cancelled.
    pub fn register(&self, workflow_execution_id: &str) -> Result<CallbackToken, CallbackError> {
        let mut registry = self.registry();

        if registry.cancelled.contains(workflow_execution_id) {
            return Err(CallbackError::Cancelled(workflow_execution_id.to_string()));
        }

        let token = CallbackToken::generate();
        let (sender, receiver) = oneshot::channel();
        registry.waiters.insert(
            token.clone(),
            Waiter {
                workflow_execution_id: workflow_execution_id.to_string(),
                sender: Some(sender),
                receiver: Some(receiver),
            },
        );

        debug!("Registered callback token {}", token);
        Ok(token)
    }

    /// Suspends until `token` is resolved or `timeout` elapses.
    ///
    /// On timeout the waiter is dropped, so a late `resolve` for the same
    /// token is rejected as unknown.
    pub async fn await_completion(
        &self,
        token: &CallbackToken,
        timeout: Duration,
    ) -> Result<JobOutcome, CallbackError> {
        let receiver = {
            let mut registry = self.registry();
            registry
                .waiters
                .get_mut(token)
                .and_then(|waiter| waiter.receiver.take())
                .ok_or_else(|| CallbackError::UnknownOrDuplicateToken(token.to_string()))?
        };

        let result = tokio::time::timeout(timeout, receiver).await;
        self.registry().waiters.remove(token);

        match result {
            Ok(Ok(outcome)) => Ok(outcome),
            // Sender dropped without a value: the waiter was released.
            Ok(Err(_)) => Ok(JobOutcome::Cancelled),
            Err(_) => {
                warn!("Callback token {} timed out after {:?}", token, timeout);
                Err(CallbackError::Timeout)
            }
        }
    }

    /// Delivers an outcome to the task waiting on `token`.
    ///
    /// Unknown and already-resolved tokens are rejected and logged; the
    /// channel and any other pending wait are unaffected.
    pub fn resolve(&self, token: &CallbackToken, outcome: JobOutcome) -> Result<(), CallbackError> {
        let sender = {
            let mut registry = self.registry();
            let sender = registry
                .waiters
                .get_mut(token)
                .and_then(|waiter| waiter.sender.take());

            // Keep the entry only while its receiver still waits to be claimed.
            if registry
                .waiters
                .get(token)
                .is_some_and(|waiter| waiter.receiver.is_none())
            {
                registry.waiters.remove(token);
            }
            sender
        };

        let Some(sender) = sender else {
            warn!("Rejected callback for unknown or already resolved token {}", token);
            return Err(CallbackError::UnknownOrDuplicateToken(token.to_string()));
        };

        debug!("Resolving callback token {} with {:?}", token, outcome);
        if sender.send(outcome).is_err() {
            // The waiter timed out or was dropped after claiming the receiver.
            warn!("Rejected late callback for token {}", token);
            return Err(CallbackError::UnknownOrDuplicateToken(token.to_string()));
        }
        Ok(())
    }

    /// Drops a token whose job never reached the remote side.
    pub fn discard(&self, token: &CallbackToken) {
        if self.registry().waiters.remove(token).is_some() {
            debug!("Discarded callback token {}", token);
        }
    }

    /// Releases every pending wait of a run with `Cancelled` and refuses
    /// new registrations for it. Returns the number of waits released.
    pub fn cancel_execution(&self, workflow_execution_id: &str) -> usize {
        let released: Vec<oneshot::Sender<JobOutcome>> = {
            let mut registry = self.registry();
            registry.cancelled.insert(workflow_execution_id.to_string());

            let senders = registry
                .waiters
                .values_mut()
                .filter(|waiter| waiter.workflow_execution_id == workflow_execution_id)
                .filter_map(|waiter| waiter.sender.take())
                .collect();

            registry.waiters.retain(|_, waiter| {
                waiter.workflow_execution_id != workflow_execution_id || waiter.receiver.is_some()
            });
            senders
        };

        let count = released.len();
        for sender in released {
            let _ = sender.send(JobOutcome::Cancelled);
        }

        info!(
            "Cancelled run '{}': released {} pending callbacks",
            workflow_execution_id, count
        );
        count
    }

    /// Forgets the cancellation marker and any leftover waiters of a run.
    pub fn release_execution(&self, workflow_execution_id: &str) {
        let mut registry = self.registry();
        registry.cancelled.remove(workflow_execution_id);
        registry
            .waiters
            .retain(|_, waiter| waiter.workflow_execution_id != workflow_execution_id);
    }

    /// Number of tokens registered and not yet resolved.
    pub fn pending_count(&self) -> usize {
        self.registry()
            .waiters
            .values()
            .filter(|waiter| waiter.sender.is_some())
            .count()
    }
}
