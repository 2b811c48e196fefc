// Error types for the relay server, the client manager, and configuration.
//
// `ConnectionError` is what a server connection worker's read/dispatch step
// can fail with. It sorts failures into the three classes the worker treats
// differently:
// - `Protocol`:  the peer sent bytes we cannot decode. The stream is no
//                longer framed, so the peer gets a `DisconnectPacket` and is
//                closed.
// - `Transport`: the socket itself failed or hit EOF mid-frame. Nothing can
//                be sent, so the worker just cleans up.
// - `Handling`:  the packet decoded fine but its handler refused or failed.
//                Treated like `Protocol`.
//
// An I/O error surfacing from the decoder is a transport failure, not a
// protocol one, which is why `From<PacketError>` is hand-written.

use std::io;
use std::path::PathBuf;

use chatroom_protocol::{HandlingError, PacketError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(PacketError),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("handling error: {0}")]
    Handling(#[from] HandlingError),
}

impl From<PacketError> for ConnectionError {
    fn from(err: PacketError) -> Self {
        match err {
            PacketError::Io(e) => ConnectionError::Transport(e),
            other => ConnectionError::Protocol(other),
        }
    }
}

impl ConnectionError {
    /// Whether the peer should be sent a `DisconnectPacket` before closing.
    /// Transport failures cannot be told anything.
    pub fn notifies_peer(&self) -> bool {
        !matches!(self, ConnectionError::Transport(_))
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no local display name to identify with")]
    NoDisplayName,

    #[error("could not resolve any address for {0}")]
    Unresolved(String),

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("failed to encode packet: {0}")]
    Encode(#[from] PacketError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
