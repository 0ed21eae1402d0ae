//! Callback Boundary
//!
//! Turns a remote completion notification into a [`JobOutcome`] and
//! resolves the matching token. Failed jobs get a structured error
//! message pulled from their result log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::callback::{CallbackChannel, CallbackToken, JobOutcome};
use crate::error::CallbackError;

/// Marker line preceding the code and message lines in a failed job log.
const ERROR_MARKER: &str = "Error Code";

/// Completion signal sent by the remote side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CallbackNotification {
    pub callback_token: CallbackToken,
    /// 0 on success, anything else on failure
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_location: Option<PathBuf>,
}

impl CallbackNotification {
    pub fn new(callback_token: CallbackToken, exit_code: i32, log_location: Option<PathBuf>) -> Self {
        Self {
            callback_token,
            exit_code,
            log_location,
        }
    }
}

/// Entry point for remote completion notifications.
#[derive(Clone)]
pub struct CallbackReceiver {
    channel: Arc<CallbackChannel>,
}

impl CallbackReceiver {
    pub fn new(channel: Arc<CallbackChannel>) -> Self {
        Self { channel }
    }

    /// Resolves the notification's token with the outcome it describes.
    pub async fn deliver(&self, notification: CallbackNotification) -> Result<(), CallbackError> {
        let outcome = if notification.exit_code == 0 {
            if let Some(path) = &notification.log_location {
                info!(
                    "Job for token {} succeeded, result log at {}",
                    notification.callback_token,
                    path.display()
                );
            }
            JobOutcome::Succeeded
        } else {
            let message = match &notification.log_location {
                Some(path) => read_error_message(path).await,
                None => None,
            };
            let message =
                message.unwrap_or_else(|| format!("exit code {}", notification.exit_code));
            debug!(
                "Job for token {} failed: {}",
                notification.callback_token, message
            );
            JobOutcome::Failed(message)
        };

        self.channel.resolve(&notification.callback_token, outcome)
    }
}

async fn read_error_message(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => extract_error_message(&content),
        Err(e) => {
            warn!("Could not read job log {}: {}", path.display(), e);
            None
        }
    }
}

/// Extracts the first error block from a job log.
///
/// The block is a line starting with `Error Code`, followed by the code
/// line and the message line.
pub fn extract_error_message(log: &str) -> Option<String> {
    let lines: Vec<&str> = log.lines().collect();

    lines
        .iter()
        .position(|line| line.starts_with(ERROR_MARKER))
        .and_then(|i| {
            let code = lines.get(i + 1)?.trim();
            let message = lines.get(i + 2).map(|line| line.trim()).unwrap_or("");
            Some(format!("Error Code : {}\nError Message : {}", code, message))
        })
}
