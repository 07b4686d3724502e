//! Daemon client shared by the CLI client and the remote worker.
//!
//! Connects to the daemon socket, performs the handshake for the given
//! role and offers one method per request. Unsolicited `work_available`
//! pushes that arrive while a response is awaited are remembered and
//! surfaced through [`DaemonClient::take_work_available`].

use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::Framed;

use crate::asset::AssetId;
use crate::ipc::codec::LengthPrefixedCodec;
use crate::ipc::protocol::{Message, PROTOCOL_VERSION, PendingDescriptor, Role, Status};
use crate::queue::Outcome;

use super::ClientError;

pub struct DaemonClient {
    framed: Framed<UnixStream, LengthPrefixedCodec>,
    next_id: u32,
    work_available: bool,
}

impl DaemonClient {
    /// Connect to the daemon and perform the handshake.
    pub async fn connect(socket_path: &Path, role: Role) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(socket_path).await.map_err(|e| {
            ClientError::Daemon(format!("connect {} failed: {e}", socket_path.display()))
        })?;
        let mut framed = Framed::new(stream, LengthPrefixedCodec::new());

        framed
            .send(Message::Hello {
                id: 0,
                version: PROTOCOL_VERSION,
                role,
            })
            .await
            .map_err(|e| ClientError::Daemon(format!("send hello: {e}")))?;

        match framed.next().await {
            Some(Ok(Message::HelloAck {
                status: Status::Ok, ..
            })) => {}
            Some(Ok(Message::HelloAck {
                status: Status::Error,
                error,
                ..
            })) => {
                return Err(ClientError::Daemon(format!(
                    "handshake rejected: {}",
                    error.unwrap_or_default()
                )));
            }
            other => {
                return Err(ClientError::Daemon(format!(
                    "unexpected handshake response: {other:?}"
                )));
            }
        }

        Ok(Self {
            framed,
            next_id: 1, // 0 = Hello
            work_available: false,
        })
    }

    /// Submit a delete request.
    pub async fn enqueue(&mut self, asset: &str) -> Result<(), ClientError> {
        let id = self.next_id();
        let response = self
            .request(
                "enqueue",
                Message::Enqueue {
                    id,
                    asset: asset.to_string(),
                },
            )
            .await?;
        match response {
            Message::Response {
                status: Status::Ok, ..
            } => Ok(()),
            other => Err(rejected("enqueue", other)),
        }
    }

    /// List pending identifiers with their in-flight flag.
    pub async fn list_pending(&mut self) -> Result<Vec<PendingDescriptor>, ClientError> {
        let id = self.next_id();
        let response = self.request("list_pending", Message::ListPending { id }).await?;
        match response {
            Message::Response {
                status: Status::Ok,
                pending,
                ..
            } => Ok(pending.unwrap_or_default()),
            other => Err(rejected("list_pending", other)),
        }
    }

    /// Claim the next eligible identifier (executor role only).
    pub async fn request_next(&mut self) -> Result<Option<AssetId>, ClientError> {
        let id = self.next_id();
        let response = self.request("request_next", Message::RequestNext { id }).await?;
        match response {
            Message::Response {
                status: Status::Ok,
                asset,
                ..
            } => Ok(asset.and_then(AssetId::parse)),
            other => Err(rejected("request_next", other)),
        }
    }

    /// Report the outcome for a claimed identifier (executor role only).
    pub async fn report(&mut self, asset: &AssetId, outcome: Outcome) -> Result<(), ClientError> {
        let id = self.next_id();
        let asset = asset.to_string();
        let (op, request) = match outcome {
            Outcome::Deleted => ("mark_deleted", Message::MarkDeleted { id, asset }),
            Outcome::Failed => ("mark_failed", Message::MarkFailed { id, asset }),
        };
        let response = self.request(op, request).await?;
        match response {
            Message::Response {
                status: Status::Ok, ..
            } => Ok(()),
            other => Err(rejected(op, other)),
        }
    }

    /// Whether a `work_available` push arrived since the last call.
    pub fn take_work_available(&mut self) -> bool {
        std::mem::take(&mut self.work_available)
    }

    /// Wait for the next `work_available` push.
    pub async fn wait_for_work(&mut self) -> Result<(), ClientError> {
        if self.take_work_available() {
            return Ok(());
        }
        match self.framed.next().await {
            Some(Ok(Message::WorkAvailable { .. })) => Ok(()),
            Some(Ok(other)) => Err(ClientError::Daemon(format!(
                "unexpected message while idle: {other:?}"
            ))),
            Some(Err(e)) => Err(ClientError::Daemon(format!("receive: {e}"))),
            None => Err(ClientError::Daemon("daemon closed the connection".into())),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = following_id(id);
        id
    }

    /// Send a request and read until its response, noting pushes on the way.
    async fn request(&mut self, op: &str, request: Message) -> Result<Message, ClientError> {
        self.framed
            .send(request)
            .await
            .map_err(|e| ClientError::Daemon(format!("send {op}: {e}")))?;

        loop {
            match self.framed.next().await {
                Some(Ok(Message::WorkAvailable { .. })) => self.work_available = true,
                Some(Ok(response @ Message::Response { .. })) => return Ok(response),
                Some(Ok(other)) => {
                    return Err(ClientError::Daemon(format!(
                        "unexpected {op} response: {other:?}"
                    )));
                }
                Some(Err(e)) => return Err(ClientError::Daemon(format!("receive {op}: {e}"))),
                None => {
                    return Err(ClientError::Daemon(format!(
                        "daemon closed the connection during {op}"
                    )));
                }
            }
        }
    }
}

/// Describe a response that did not carry `status: ok`.
fn rejected(op: &str, response: Message) -> ClientError {
    match response {
        Message::Response {
            error: Some(error), ..
        } => ClientError::Daemon(format!("{op} failed: {error}")),
        other => ClientError::Daemon(format!("{op} failed: {other:?}")),
    }
}

/// Request ids wrap around but never reuse 0, which belongs to Hello.
fn following_id(id: u32) -> u32 {
    id.wrapping_add(1).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_skip_hello_on_wrap() {
        assert_eq!(following_id(1), 2);
        assert_eq!(following_id(u32::MAX - 1), u32::MAX);
        assert_eq!(following_id(u32::MAX), 1);
    }
}
