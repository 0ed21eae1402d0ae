//! Scripted remote executor for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::callback::{CallbackChannel, CallbackToken, JobOutcome};
use super::executor::{DispatchCommand, DispatchHandle, RemoteExecutor};
use crate::error::{CallbackError, DispatchError};

/// How the fake remote side treats a script.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Report success after a short delay
    Succeed,
    /// Report failure with this message after a short delay
    Fail(String),
    /// Reject the dispatch
    Reject,
    /// Accept and never report back until [`ScriptedExecutor::release`]
    Hold,
}

/// Remote executor that resolves callbacks according to a per-script plan.
pub struct ScriptedExecutor {
    channel: Arc<CallbackChannel>,
    behaviors: Mutex<HashMap<String, Behavior>>,
    dispatched: Mutex<Vec<String>>,
    tokens: Mutex<HashMap<String, CallbackToken>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Self::with_channel(Arc::new(CallbackChannel::new()))
    }

    pub fn with_channel(channel: Arc<CallbackChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behaviors: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(Vec::new()),
            tokens: Mutex::new(HashMap::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(5),
        })
    }

    pub fn channel(&self) -> Arc<CallbackChannel> {
        Arc::clone(&self.channel)
    }

    pub fn set_behavior(&self, script: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(script.to_string(), behavior);
    }

    /// Scripts in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Highest number of jobs accepted and not yet reported back.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn token_for(&self, script: &str) -> Option<CallbackToken> {
        self.tokens.lock().unwrap().get(script).cloned()
    }

    /// Reports the outcome of a held script.
    pub fn release(&self, script: &str, outcome: JobOutcome) -> Result<(), CallbackError> {
        let token = self
            .token_for(script)
            .ok_or_else(|| CallbackError::UnknownOrDuplicateToken(script.to_string()))?;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.channel.resolve(&token, outcome)
    }

    /// Polls until `count` scripts have been dispatched.
    pub async fn wait_for_dispatches(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.dispatched.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        false
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn dispatch(&self, command: &DispatchCommand) -> Result<DispatchHandle, DispatchError> {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&command.script)
            .cloned()
            .unwrap_or(Behavior::Succeed);

        if let Behavior::Reject = behavior {
            self.dispatched.lock().unwrap().push(command.script.clone());
            return Err(DispatchError::Rejected(format!(
                "{} refused by fake target",
                command.script
            )));
        }

        self.tokens
            .lock()
            .unwrap()
            .insert(command.script.clone(), command.callback_token.clone());
        self.dispatched.lock().unwrap().push(command.script.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = match behavior {
            Behavior::Succeed => JobOutcome::Succeeded,
            Behavior::Fail(message) => JobOutcome::Failed(message),
            Behavior::Hold | Behavior::Reject => {
                return Ok(DispatchHandle::new(format!("held-{}", command.script)));
            }
        };

        let channel = Arc::clone(&self.channel);
        let in_flight = Arc::clone(&self.in_flight);
        let token = command.callback_token.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the gauge before the waiter wakes and frees its slot.
            in_flight.fetch_sub(1, Ordering::SeqCst);
            let _ = channel.resolve(&token, outcome);
        });

        Ok(DispatchHandle::new(format!("fake-{}", command.script)))
    }
}
