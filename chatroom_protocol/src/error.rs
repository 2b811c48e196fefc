// Error types for the chat protocol.
//
// `PacketError` covers everything that can go wrong turning bytes into a
// `Packet` (or a `Packet` into bytes). Apart from `Io`, every variant means
// the stream is no longer framed correctly: there is no way to skip a payload
// of unknown length, so callers must tear the connection down.
//
// `HandlingError` is returned by `PacketHandler` implementations when a
// decoded packet cannot be acted on. `RegistryError` is a startup-time
// misconfiguration of the packet table.

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::types::PacketTypeId;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("unknown packet type id {0}")]
    UnknownType(PacketTypeId),

    #[error("string of {len} bytes exceeds the maximum of {max} bytes")]
    StringTooLong { len: usize, max: u32 },

    #[error("string payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl PacketError {
    /// True when the error came from the underlying stream rather than from
    /// the bytes themselves.
    pub fn is_io(&self) -> bool {
        matches!(self, PacketError::Io(_))
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("packet type id {id} is already registered to {existing}")]
    DuplicateTypeId {
        id: PacketTypeId,
        existing: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum HandlingError {
    /// The handler refused the packet in its current state.
    #[error("{0}")]
    Rejected(String),

    /// A response could not be encoded.
    #[error("failed to encode response: {0}")]
    Encode(#[from] PacketError),
}
