//! Remote Executors
//!
//! A remote executor accepts one script invocation and returns at once
//! with a handle; completion arrives later through the callback boundary.
//!
//! - [`ShellExecutor`]: runs scripts with `sh` in a detached task
//! - [`DryRunExecutor`]: prints the command and reports success

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::process::Command;

use super::callback::CallbackToken;
use super::notify::{CallbackNotification, CallbackReceiver};
use crate::error::DispatchError;

/// Everything the remote side needs to run one script and report back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DispatchCommand {
    pub callback_token: CallbackToken,
    pub workflow_id: String,
    pub workflow_execution_id: String,
    pub script: String,
    pub result_log_location: PathBuf,
}

/// Correlation handle returned by a dispatch (command id, pid, ...).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct DispatchHandle(String);

impl DispatchHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dispatches scripts to a remote target without waiting for them.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Starts `command.script`; never blocks for its completion.
    async fn dispatch(&self, command: &DispatchCommand) -> Result<DispatchHandle, DispatchError>;
}

/// Result log path for a script started now: `{log_dir}/{script}-{timestamp}.log`.
pub fn result_log_location(log_dir: &Path, script: &str) -> PathBuf {
    let stamp = Utc::now().format("%m-%d-%y-%H-%M-%S");
    let file_name = script.replace(['/', '\\'], "_");
    log_dir.join(format!("{}-{}.log", file_name, stamp))
}

/// Runs scripts from a local directory with `sh`.
///
/// Output goes to the command's result log; when the process exits a
/// [`CallbackNotification`] carrying its exit code is delivered.
pub struct ShellExecutor {
    scripts_dir: PathBuf,
    receiver: CallbackReceiver,
}

impl ShellExecutor {
    pub fn new(scripts_dir: impl Into<PathBuf>, receiver: CallbackReceiver) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            receiver,
        }
    }

    async fn open_log(path: &Path) -> Result<(Stdio, Stdio), DispatchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DispatchError::Rejected(format!(
                    "cannot create log directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = File::create(path)
            .await
            .map_err(|e| {
                DispatchError::Rejected(format!("cannot create log {}: {}", path.display(), e))
            })?
            .into_std()
            .await;
        let stderr = file
            .try_clone()
            .map_err(|e| DispatchError::Rejected(format!("cannot share log handle: {}", e)))?;

        Ok((Stdio::from(file), Stdio::from(stderr)))
    }
}

#[async_trait]
impl RemoteExecutor for ShellExecutor {
    async fn dispatch(&self, command: &DispatchCommand) -> Result<DispatchHandle, DispatchError> {
        let script_path = self.scripts_dir.join(&command.script);
        let is_file = fs::metadata(&script_path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(DispatchError::ScriptNotFound(
                script_path.display().to_string(),
            ));
        }

        let (stdout, stderr) = Self::open_log(&command.result_log_location).await?;

        let mut child = Command::new("sh")
            .arg(&script_path)
            .env("LOADFLOW_CALLBACK_TOKEN", command.callback_token.as_str())
            .env("LOADFLOW_WORKFLOW_ID", &command.workflow_id)
            .env("LOADFLOW_WORKFLOW_EXECUTION_ID", &command.workflow_execution_id)
            .env("LOADFLOW_RESULT_LOG", &command.result_log_location)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| DispatchError::Unreachable(format!("failed to spawn sh: {}", e)))?;

        let handle = DispatchHandle::new(match child.id() {
            Some(pid) => format!("pid-{}", pid),
            None => format!("local-{}", command.callback_token),
        });

        info!("Dispatched '{}' ({})", command.script, handle);

        let receiver = self.receiver.clone();
        let token = command.callback_token.clone();
        let log_location = command.result_log_location.clone();
        let script = command.script.clone();

        tokio::spawn(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    error!("Failed waiting on '{}': {}", script, e);
                    -1
                }
            };
            debug!("Script '{}' exited with {}", script, exit_code);

            let notification = CallbackNotification::new(token, exit_code, Some(log_location));
            if let Err(e) = receiver.deliver(notification).await {
                warn!("Completion of '{}' not delivered: {}", script, e);
            }
        });

        Ok(handle)
    }
}

/// Prints each dispatch and reports immediate success.
pub struct DryRunExecutor {
    receiver: CallbackReceiver,
}

impl DryRunExecutor {
    pub fn new(receiver: CallbackReceiver) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl RemoteExecutor for DryRunExecutor {
    async fn dispatch(&self, command: &DispatchCommand) -> Result<DispatchHandle, DispatchError> {
        println!();
        println!("[DRY RUN] Script: {}", command.script);
        println!("  Workflow: {}", command.workflow_id);
        println!("  Execution: {}", command.workflow_execution_id);
        println!("  Result log: {}", command.result_log_location.display());

        let notification = CallbackNotification::new(command.callback_token.clone(), 0, None);
        if let Err(e) = self.receiver.deliver(notification).await {
            warn!("Dry run completion for '{}' not delivered: {}", command.script, e);
        }

        Ok(DispatchHandle::new("dry-run"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::callback::{CallbackChannel, JobOutcome};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    fn command(channel: &CallbackChannel, script: &str, log_dir: &Path) -> DispatchCommand {
        DispatchCommand {
            callback_token: channel.register("run-1").unwrap(),
            workflow_id: "wf".into(),
            workflow_execution_id: "run-1".into(),
            script: script.into(),
            result_log_location: result_log_location(log_dir, script),
        }
    }

    #[test]
    fn test_result_log_location() {
        let path = result_log_location(Path::new("/logs"), "sub/load.sql");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sub_load.sql-"));
        assert!(name.ends_with(".log"));
        assert_eq!(path.parent().unwrap(), Path::new("/logs"));
    }

    #[tokio::test]
    async fn test_shell_executor_success() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ok.sh"), "echo loading\nexit 0\n").unwrap();

        let channel = Arc::new(CallbackChannel::new());
        let executor = ShellExecutor::new(
            dir.path(),
            CallbackReceiver::new(Arc::clone(&channel)),
        );

        let cmd = command(&channel, "ok.sh", &dir.path().join("logs"));
        let handle = executor.dispatch(&cmd).await.unwrap();
        assert!(!handle.as_str().is_empty());

        let outcome = channel
            .await_completion(&cmd.callback_token, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);

        let log = std::fs::read_to_string(&cmd.result_log_location).unwrap();
        assert!(log.contains("loading"));
    }

    #[tokio::test]
    async fn test_shell_executor_failure_extracts_error() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.sh"),
            "echo 'Error Code'\necho 23505\necho 'duplicate key'\nexit 4\n",
        )
        .unwrap();

        let channel = Arc::new(CallbackChannel::new());
        let executor = ShellExecutor::new(
            dir.path(),
            CallbackReceiver::new(Arc::clone(&channel)),
        );

        let cmd = command(&channel, "bad.sh", &dir.path().join("logs"));
        executor.dispatch(&cmd).await.unwrap();

        let outcome = channel
            .await_completion(&cmd.callback_token, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed("Error Code : 23505\nError Message : duplicate key".into())
        );
    }

    #[tokio::test]
    async fn test_shell_executor_creates_nested_log_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("ok.sh"), "exit 0\n").unwrap();

        let channel = Arc::new(CallbackChannel::new());
        let executor = ShellExecutor::new(
            dir.path(),
            CallbackReceiver::new(Arc::clone(&channel)),
        );

        let log_dir = dir.path().join("logs").join("2024").join("06");
        let cmd = command(&channel, "ok.sh", &log_dir);
        executor.dispatch(&cmd).await.unwrap();

        let outcome = channel
            .await_completion(&cmd.callback_token, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
        assert!(cmd.result_log_location.is_file());
    }

    #[tokio::test]
    async fn test_shell_executor_rejects_directory_as_script() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested.sh")).unwrap();
        let channel = Arc::new(CallbackChannel::new());
        let executor = ShellExecutor::new(
            dir.path(),
            CallbackReceiver::new(Arc::clone(&channel)),
        );

        let cmd = command(&channel, "nested.sh", dir.path());
        let result = executor.dispatch(&cmd).await;
        assert!(matches!(result, Err(DispatchError::ScriptNotFound(_))));
    }

    #[tokio::test]
    async fn test_shell_executor_missing_script() {
        let dir = tempdir().unwrap();
        let channel = Arc::new(CallbackChannel::new());
        let executor = ShellExecutor::new(
            dir.path(),
            CallbackReceiver::new(Arc::clone(&channel)),
        );

        let cmd = command(&channel, "missing.sh", dir.path());
        let result = executor.dispatch(&cmd).await;
        assert!(matches!(result, Err(DispatchError::ScriptNotFound(_))));
    }

    #[tokio::test]
    async fn test_dry_run_resolves_immediately() {
        let dir = tempdir().unwrap();
        let channel = Arc::new(CallbackChannel::new());
        let executor = DryRunExecutor::new(CallbackReceiver::new(Arc::clone(&channel)));

        let cmd = command(&channel, "anything.sql", dir.path());
        let handle = executor.dispatch(&cmd).await.unwrap();
        assert_eq!(handle.as_str(), "dry-run");

        let outcome = channel
            .await_completion(&cmd.callback_token, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded);
    }
}
