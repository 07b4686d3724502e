//! Command executor: delegates each delete to an external program.
//!
//! The asset identifier is appended as the final argument. Exit status 0
//! means the backend deleted the asset; anything else is a failure.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::asset::AssetId;

use super::{DeletionExecutor, ExecutorError};

/// Default upper bound for a single delete command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl DeletionExecutor for CommandExecutor {
    async fn delete(&self, asset: &AssetId) -> Result<(), ExecutorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(asset.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(asset = %asset, error = %e, "failed to kill timed-out delete command");
                }
                return Err(ExecutorError::Timeout(self.timeout));
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(ExecutorError::Exit(status.code()))
        }
    }
}
