//! Runtime configuration: socket and store locations, executor settings.
//!
//! Paths follow the XDG base directory layout: the socket lives under
//! `$XDG_RUNTIME_DIR/assetreaper/`, the pending-set snapshot under
//! `$XDG_STATE_HOME/assetreaper/` (or `$HOME/.local/state/assetreaper/`).

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use crate::executor::CommandExecutor;

const APP_DIR: &str = "assetreaper";
const SOCKET_NAME: &str = "daemon.sock";
const STORE_NAME: &str = "pending.msgpack";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("$XDG_RUNTIME_DIR is not set")]
    NoRuntimeDir,
    #[error("neither $XDG_STATE_HOME nor $HOME is set; pass --store")]
    NoStateDir,
    #[error("--workers must be at least 1")]
    NoWorkers,
}

/// Everything `assetreaper daemon` needs to start.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub store_path: PathBuf,
    /// In-process workers; `None` leaves deletion to remote executors.
    pub exec: Option<ExecConfig>,
}

/// External delete command and how many copies may run at once.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub program: String,
    pub args: Vec<String>,
    pub workers: usize,
    pub timeout: Duration,
}

impl ExecConfig {
    pub fn executor(&self) -> CommandExecutor {
        CommandExecutor::new(self.program.clone(), self.args.clone()).with_timeout(self.timeout)
    }
}

/// `$XDG_RUNTIME_DIR/assetreaper/daemon.sock`.
pub fn socket_path() -> Result<PathBuf, ConfigError> {
    socket_path_from(std::env::var_os("XDG_RUNTIME_DIR"))
}

/// Default snapshot location for the pending set.
pub fn default_store_path() -> Result<PathBuf, ConfigError> {
    store_path_from(
        std::env::var_os("XDG_STATE_HOME"),
        std::env::var_os("HOME"),
    )
}

fn socket_path_from(runtime_dir: Option<OsString>) -> Result<PathBuf, ConfigError> {
    let runtime_dir = runtime_dir
        .filter(|d| !d.is_empty())
        .ok_or(ConfigError::NoRuntimeDir)?;
    Ok(PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_NAME))
}

fn store_path_from(
    state_home: Option<OsString>,
    home: Option<OsString>,
) -> Result<PathBuf, ConfigError> {
    let state_dir = match state_home.filter(|d| !d.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => {
            let home = home.filter(|d| !d.is_empty()).ok_or(ConfigError::NoStateDir)?;
            PathBuf::from(home).join(".local").join("state")
        }
    };
    Ok(state_dir.join(APP_DIR).join(STORE_NAME))
}
