//! Remote deletion worker.
//!
//! Connects to the daemon with `Role::Executor`, claims identifiers one
//! at a time, runs the delete command for each and reports the outcome.
//! When the queue runs dry the worker idles until the daemon pushes
//! `work_available`. If the worker dies mid-delete, the daemon releases
//! its claim so another executor can pick the identifier up.

use tokio_util::sync::CancellationToken;

use crate::client::{ClientError, DaemonClient};
use crate::config::{self, ConfigError, ExecConfig};
use crate::executor::DeletionExecutor;
use crate::ipc::protocol::Role;
use crate::queue::Outcome;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run a worker against the local daemon until SIGTERM or SIGINT.
pub async fn run(exec: ExecConfig) -> Result<(), WorkerError> {
    let socket_path = config::socket_path()?;

    let shutdown = CancellationToken::new();
    crate::daemon::spawn_signal_handler(shutdown.clone())?;

    let mut daemon = DaemonClient::connect(&socket_path, Role::Executor).await?;
    tracing::info!(path = %socket_path.display(), program = %exec.program, "worker connected");

    let handled = drive(&mut daemon, &exec.executor(), &shutdown).await?;
    tracing::info!(handled, "worker stopped");
    Ok(())
}

/// Claim and delete until `shutdown` is cancelled.
///
/// Returns the number of identifiers resolved. A delete in progress when
/// `shutdown` fires is finished and reported first.
pub async fn drive<E: DeletionExecutor>(
    daemon: &mut DaemonClient,
    executor: &E,
    shutdown: &CancellationToken,
) -> Result<usize, WorkerError> {
    let mut handled = 0;
    loop {
        while !shutdown.is_cancelled() {
            let Some(asset) = daemon.request_next().await? else {
                break;
            };
            let outcome = match executor.delete(&asset).await {
                Ok(()) => Outcome::Deleted,
                Err(e) => {
                    tracing::warn!(asset = %asset, error = %e, "delete attempt failed");
                    Outcome::Failed
                }
            };
            daemon.report(&asset, outcome).await?;
            handled += 1;
        }

        tokio::select! {
            woke = daemon.wait_for_work() => woke?,
            _ = shutdown.cancelled() => return Ok(handled),
        }
    }
}
