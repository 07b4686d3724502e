//! Deletion daemon: durable queue behind a Unix socket.
//!
//! Architecture: channel-based actor. A single daemon loop owns the
//! connection table and executor claims ([`state::DaemonState`]).
//! Per-connection tasks forward requests via mpsc channels; the loop
//! answers each one and pushes `work_available` to executor connections
//! whenever new work may be eligible. Optional in-process workers pull
//! from the same [`DeletionQueue`] handle.

mod connection;
mod handler;
pub mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use connection::{DaemonCommand, DisconnectNotice};
use handler::WakeExecutors;
use state::{ConnectionId, DaemonState};

use crate::config::{ConfigError, DaemonConfig, ExecConfig};
use crate::executor;
use crate::ipc::protocol::Message;
use crate::queue::DeletionQueue;
use crate::store::{FileStore, IdentifierStore, StoreError};

/// Daemon startup/runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("daemon already running at {0}")]
    AlreadyRunning(PathBuf),
    #[error("failed to create directory {path}: {source}")]
    MkdirFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to bind socket {path}: {source}")]
    BindFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("identifier store: {0}")]
    Store(#[from] StoreError),
    #[error("deletion worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run the daemon until SIGTERM or SIGINT.
///
/// Opens the durable store, binds the socket, starts any configured
/// in-process workers and serves requests. Identifiers that were in
/// flight when the previous process stopped are eligible again.
///
/// # Errors
///
/// Returns `DaemonError` if the store cannot be opened, the socket cannot
/// be bound, another daemon is already running, or a worker hits a store
/// failure.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    let store = FileStore::open(&config.store_path)?;
    let queue = DeletionQueue::new(store);
    let pending = queue.snapshot()?.len();
    tracing::info!(
        store = %config.store_path.display(),
        pending,
        "loaded pending deletions"
    );

    let listener = bind_socket(&config.socket_path).await?;
    tracing::info!(path = %config.socket_path.display(), "daemon listening");

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let result = serve(listener, queue, config.exec.as_ref(), shutdown).await;

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        tracing::warn!(error = %e, path = %config.socket_path.display(), "failed to remove socket");
    }
    tracing::info!("daemon stopped");
    result
}

/// Serve connections until `shutdown` is cancelled or a worker fails.
pub(crate) async fn serve<S>(
    listener: UnixListener,
    queue: DeletionQueue<S>,
    exec: Option<&ExecConfig>,
    shutdown: CancellationToken,
) -> Result<(), DaemonError>
where
    S: IdentifierStore + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<DaemonCommand>();
    let (disconnect_tx, mut disconnect_rx) = mpsc::unbounded_channel::<DisconnectNotice>();
    let mut push_senders: HashMap<ConnectionId, mpsc::UnboundedSender<Message>> = HashMap::new();

    let mut workers = JoinSet::new();
    if let Some(exec) = exec {
        let command = Arc::new(exec.executor());
        for _ in 0..exec.workers {
            workers.spawn(executor::run_worker(
                queue.clone(),
                Arc::clone(&command),
                shutdown.child_token(),
            ));
        }
        tracing::info!(workers = exec.workers, program = %exec.program, "started deletion workers");
    }

    let mut state = DaemonState::new(queue);
    let mut result = Ok(());

    loop {
        tokio::select! {
            // -- New connection --
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        accept_connection(stream, &cmd_tx, &disconnect_tx, &mut push_senders);
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }

            // -- Request from connection task --
            Some(cmd) = cmd_rx.recv() => {
                let (response, wake) =
                    handler::handle_message(&mut state, cmd.request, cmd.connection_id);
                let _ = cmd.response_tx.send(response);
                if let Some(wake) = wake {
                    push_work_available(&state, &push_senders, wake);
                }
            }

            // -- Connection disconnected --
            Some(notice) = disconnect_rx.recv() => {
                let conn_id = notice.connection_id;
                push_senders.remove(&conn_id);
                let released = state.remove_connection(conn_id);
                if !released.is_empty() {
                    tracing::info!(?conn_id, released = released.len(), "released claims of disconnected executor");
                    push_work_available(&state, &push_senders, WakeExecutors);
                }
                tracing::debug!(?conn_id, "connection cleaned up");
            }

            // -- In-process worker exited --
            Some(joined) = workers.join_next() => {
                if let Err(e) = worker_exit(joined) {
                    tracing::error!(error = %e, "deletion worker failed");
                    result = Err(e);
                    break;
                }
            }

            _ = shutdown.cancelled() => break,
        }
    }

    shutdown.cancel();
    while let Some(joined) = workers.join_next().await {
        if let Ok(Err(e)) = joined {
            tracing::warn!(error = %e, "deletion worker failed during shutdown");
        }
    }
    result
}

/// Accept a new connection: create channels and spawn handler task.
fn accept_connection(
    stream: UnixStream,
    cmd_tx: &mpsc::UnboundedSender<DaemonCommand>,
    disconnect_tx: &mpsc::UnboundedSender<DisconnectNotice>,
    push_senders: &mut HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
) {
    let conn_id = ConnectionId::new();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    push_senders.insert(conn_id, push_tx);

    connection::spawn_connection(
        stream,
        conn_id,
        cmd_tx.clone(),
        push_rx,
        disconnect_tx.clone(),
    );

    tracing::debug!(?conn_id, "accepted connection");
}

/// Tell every executor connection that work may be eligible.
fn push_work_available<S: IdentifierStore>(
    state: &DaemonState<S>,
    push_senders: &HashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    _wake: WakeExecutors,
) {
    for conn_id in state.executors() {
        let Some(tx) = push_senders.get(&conn_id) else {
            continue;
        };
        if tx.send(Message::WorkAvailable { id: 0 }).is_err() {
            tracing::debug!(?conn_id, "work_available push failed, executor disconnected");
        }
    }
}

/// Map an in-process worker's exit to the daemon's outcome.
///
/// A panicked worker may still hold an identifier in flight with nothing
/// left to resolve it, so it stops the daemon like a store failure does.
fn worker_exit(joined: Result<Result<(), StoreError>, JoinError>) -> Result<(), DaemonError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DaemonError::Store(e)),
        Err(e) => Err(DaemonError::WorkerPanicked(e.to_string())),
    }
}

/// Cancel `shutdown` on SIGTERM or SIGINT.
pub(crate) fn spawn_signal_handler(shutdown: CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        }
        shutdown.cancel();
    });
    Ok(())
}

// -- Socket setup --

/// Create the socket directory and bind the Unix listener.
///
/// Handles stale socket detection: if EADDRINUSE, attempts to connect
/// to the existing socket. If the connection succeeds, another daemon
/// is running. If it fails, the socket is stale and is removed.
pub(crate) async fn bind_socket(path: &Path) -> Result<UnixListener, DaemonError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DaemonError::MkdirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700)).map_err(
                |e| DaemonError::MkdirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                },
            )?;
        }
    }

    let bind_failed = |source: std::io::Error| DaemonError::BindFailed {
        path: path.to_path_buf(),
        source,
    };

    match UnixListener::bind(path) {
        Ok(listener) => Ok(listener),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            if UnixStream::connect(path).await.is_ok() {
                return Err(DaemonError::AlreadyRunning(path.to_path_buf()));
            }
            tracing::info!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path).map_err(bind_failed)?;
            UnixListener::bind(path).map_err(bind_failed)
        }
        Err(e) => Err(bind_failed(e)),
    }
}
