use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, ExecConfig};

#[derive(Parser)]
#[command(name = "assetreaper", about = "Durable single-flight asset deletion queue")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the deletion daemon
    Daemon {
        /// Snapshot file for the pending set
        #[arg(long)]
        store: Option<PathBuf>,

        /// Run deletes in-process with this command (asset id appended)
        #[arg(long)]
        exec: Option<String>,

        #[command(flatten)]
        command: CommandArgs,

        /// Number of in-process workers
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },

    /// Run a remote worker that deletes on behalf of the daemon
    Worker {
        /// Delete command (asset id appended)
        #[arg(long)]
        exec: String,

        #[command(flatten)]
        command: CommandArgs,
    },

    /// One-shot daemon queries
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },
}

/// Options shared by every delete command invocation.
#[derive(Args, Debug, Clone)]
pub struct CommandArgs {
    /// Argument passed before the asset id (repeatable)
    #[arg(long = "exec-arg", allow_hyphen_values = true)]
    pub exec_args: Vec<String>,

    /// Seconds before a delete command is killed
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CommandArgs {
    pub fn into_exec(self, program: String, workers: usize) -> Result<ExecConfig, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        Ok(ExecConfig {
            program,
            args: self.exec_args,
            workers,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[derive(Subcommand)]
pub enum ClientAction {
    /// Request deletion of one or more assets
    Enqueue {
        /// Asset identifiers
        #[arg(required = true)]
        assets: Vec<String>,
    },

    /// List pending deletions
    List,
}
