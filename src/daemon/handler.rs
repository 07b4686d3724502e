//! Message dispatch and request handling.
//!
//! No socket I/O. Each handler takes the daemon state and returns a
//! response plus an optional [`WakeExecutors`] telling the daemon loop to
//! push `work_available` to executor connections.

use crate::asset::AssetId;
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, PendingDescriptor, Role, Status};
use crate::queue::Outcome;
use crate::store::{IdentifierStore, StoreError};

use super::state::{ConnectionId, DaemonState};

/// New work may be eligible; executors should be told.
#[derive(Debug, PartialEq, Eq)]
pub struct WakeExecutors;

/// Dispatch a request message to the appropriate handler.
///
/// Enforces:
/// - Executor-only messages are rejected from other roles as `unknown_type`
/// - Server-originated variants → `unknown_type`
pub fn handle_message<S: IdentifierStore>(
    state: &mut DaemonState<S>,
    request: Message,
    connection_id: ConnectionId,
) -> (Message, Option<WakeExecutors>) {
    match request {
        Message::Hello { id, version, role } => {
            let response = handle_hello(state, id, version, role, connection_id);
            (response, None)
        }
        Message::Enqueue { id, asset } => handle_enqueue(state, id, asset),
        // -- Executor-only messages --
        Message::RequestNext { id } => {
            if !is_executor(state, connection_id) {
                return (error_response(id, "unknown_type"), None);
            }
            (handle_request_next(state, id, connection_id), None)
        }
        Message::MarkDeleted { id, asset } => {
            if !is_executor(state, connection_id) {
                return (error_response(id, "unknown_type"), None);
            }
            (handle_resolve(state, id, asset, Outcome::Deleted), None)
        }
        Message::MarkFailed { id, asset } => {
            if !is_executor(state, connection_id) {
                return (error_response(id, "unknown_type"), None);
            }
            (handle_resolve(state, id, asset, Outcome::Failed), None)
        }
        Message::ListPending { id } => (handle_list_pending(state, id), None),
        // Server-originated messages should never be sent by clients.
        Message::HelloAck { id, .. }
        | Message::Response { id, .. }
        | Message::WorkAvailable { id } => (error_response(id, "unknown_type"), None),
    }
}

// -- Individual handlers --

fn handle_hello<S: IdentifierStore>(
    state: &mut DaemonState<S>,
    id: u32,
    version: u32,
    role: Role,
    connection_id: ConnectionId,
) -> Message {
    if id != 0 {
        return Message::HelloAck {
            id: 0,
            status: Status::Error,
            error: Some("invalid_hello_id".into()),
        };
    }
    if version != PROTOCOL_VERSION {
        return Message::HelloAck {
            id: 0,
            status: Status::Error,
            error: Some("version_mismatch".into()),
        };
    }
    state.add_connection(connection_id, role);
    Message::HelloAck {
        id: 0,
        status: Status::Ok,
        error: None,
    }
}

fn handle_enqueue<S: IdentifierStore>(
    state: &mut DaemonState<S>,
    id: u32,
    asset: String,
) -> (Message, Option<WakeExecutors>) {
    let Some(asset) = AssetId::parse(asset) else {
        return (error_response(id, "invalid_asset"), None);
    };
    match state.queue().enqueue(asset) {
        Ok(()) => (ok_response(id), Some(WakeExecutors)),
        Err(e) => (store_error_response(id, &e), None),
    }
}

fn handle_request_next<S: IdentifierStore>(
    state: &mut DaemonState<S>,
    id: u32,
    connection_id: ConnectionId,
) -> Message {
    match state.queue().request_next() {
        Ok(Some(asset)) => {
            let response = Message::Response {
                id,
                status: Status::Ok,
                error: None,
                asset: Some(asset.to_string()),
                pending: None,
            };
            state.claim(connection_id, asset);
            response
        }
        Ok(None) => ok_response(id),
        Err(e) => store_error_response(id, &e),
    }
}

fn handle_resolve<S: IdentifierStore>(
    state: &mut DaemonState<S>,
    id: u32,
    asset: String,
    outcome: Outcome,
) -> Message {
    let Some(asset) = AssetId::parse(asset) else {
        return error_response(id, "invalid_asset");
    };
    match state.queue().resolve(&asset, outcome) {
        Ok(()) => {
            state.settle(&asset);
            ok_response(id)
        }
        Err(e) => store_error_response(id, &e),
    }
}

fn handle_list_pending<S: IdentifierStore>(state: &DaemonState<S>, id: u32) -> Message {
    match state.queue().snapshot() {
        Ok(entries) => Message::Response {
            id,
            status: Status::Ok,
            error: None,
            asset: None,
            pending: Some(
                entries
                    .into_iter()
                    .map(|e| PendingDescriptor {
                        asset: e.asset.into_string(),
                        in_flight: e.in_flight,
                    })
                    .collect(),
            ),
        },
        Err(e) => store_error_response(id, &e),
    }
}

// -- Helpers --

fn is_executor<S: IdentifierStore>(state: &DaemonState<S>, connection_id: ConnectionId) -> bool {
    state.connection_role(connection_id) == Some(Role::Executor)
}

fn ok_response(id: u32) -> Message {
    Message::Response {
        id,
        status: Status::Ok,
        error: None,
        asset: None,
        pending: None,
    }
}

pub(super) fn error_response(id: u32, reason: &str) -> Message {
    Message::Response {
        id,
        status: Status::Error,
        error: Some(reason.into()),
        asset: None,
        pending: None,
    }
}

fn store_error_response(id: u32, error: &StoreError) -> Message {
    tracing::error!(error = %error, "identifier store operation failed");
    error_response(id, "store_unavailable")
}
