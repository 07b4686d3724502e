//! Wire protocol message types for daemon IPC.
//!
//! All messages are MessagePack-encoded maps with at minimum `type` and `id`
//! fields.

use serde::{Deserialize, Serialize};

/// All wire protocol messages.
///
/// Serialized as a tagged union on the `type` field via MessagePack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Message {
    // -- Handshake --
    #[serde(rename = "hello")]
    Hello { id: u32, version: u32, role: Role },

    #[serde(rename = "hello_ack")]
    HelloAck {
        id: u32,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // -- Producers --
    #[serde(rename = "enqueue")]
    Enqueue { id: u32, asset: String },

    // -- Executors --
    #[serde(rename = "request_next")]
    RequestNext { id: u32 },

    #[serde(rename = "mark_deleted")]
    MarkDeleted { id: u32, asset: String },

    #[serde(rename = "mark_failed")]
    MarkFailed { id: u32, asset: String },

    // -- Unsolicited (daemon → executor) --
    #[serde(rename = "work_available")]
    WorkAvailable { id: u32 },

    // -- Query --
    #[serde(rename = "list_pending")]
    ListPending { id: u32 },

    // -- Generic response --
    #[serde(rename = "response")]
    Response {
        id: u32,
        status: Status,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// `request_next` result; absent when nothing is eligible.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        asset: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pending: Option<Vec<PendingDescriptor>>,
    },
}

impl Message {
    /// Request id carried by every variant.
    pub fn id(&self) -> u32 {
        match self {
            Message::Hello { id, .. }
            | Message::HelloAck { id, .. }
            | Message::Enqueue { id, .. }
            | Message::RequestNext { id }
            | Message::MarkDeleted { id, .. }
            | Message::MarkFailed { id, .. }
            | Message::WorkAvailable { id }
            | Message::ListPending { id }
            | Message::Response { id, .. } => *id,
        }
    }
}

/// Client role in the handshake.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Submits delete requests.
    Producer,
    /// Pulls identifiers and reports outcomes.
    Executor,
    /// One-shot CLI queries.
    Client,
}

/// Response status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Pending identifier returned in list_pending responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDescriptor {
    pub asset: String,
    pub in_flight: bool,
}

/// Protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Minimal envelope for extracting `{type, id}` from unknown messages.
///
/// Used by the daemon as a fallback when [`Message`] deserialization
/// fails, so the error response can echo the request `id`.
#[derive(Debug, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    pub msg_type: String,
    pub id: u32,
}
