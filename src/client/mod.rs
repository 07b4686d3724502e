//! CLI client for daemon operations.
//!
//! One-shot commands that connect to the daemon, perform a request,
//! print the result, and exit. [`DaemonClient`] is also the transport
//! used by the remote worker.

mod daemon_client;
mod format;

pub use daemon_client::DaemonClient;

use crate::cli::ClientAction;
use crate::config::{self, ConfigError};
use crate::ipc::protocol::Role;

/// Client error type.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon: {0}")]
    Daemon(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Run the client command.
///
/// Called from `main.rs` for `Command::Client`.
pub async fn run(action: ClientAction) -> Result<(), ClientError> {
    let socket_path = config::socket_path()?;

    match action {
        ClientAction::Enqueue { assets } => {
            let mut daemon = DaemonClient::connect(&socket_path, Role::Producer).await?;
            for asset in &assets {
                daemon.enqueue(asset).await?;
                format::print_enqueued(asset);
            }
        }
        ClientAction::List => {
            let mut daemon = DaemonClient::connect(&socket_path, Role::Client).await?;
            let pending = daemon.list_pending().await?;
            format::print_pending(&pending);
        }
    }

    Ok(())
}
