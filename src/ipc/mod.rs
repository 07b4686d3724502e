//! IPC codec and wire protocol: MessagePack framing over a Unix socket.

pub mod codec;
pub mod protocol;
