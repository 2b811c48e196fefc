// Packet model: the typed units of the chat protocol.
//
// Each packet kind is a small struct with a fixed `TYPE_ID`, a payload
// encoder and a payload decoder. `Packet` is the sum of all kinds; it owns the
// frame layout (`[u32 type id][payload]`) and routes a decoded value to
// exactly one method of a `PacketHandler`.
//
// Kinds:
// - `MessagePacket` (0): a chat line, relayed verbatim.
// - `DisconnectPacket` (1): the sender is ending the connection, with a
//   human-readable reason.
// - `IdentityPacket` (2): the display name a client wants to chat under.
//   Servers also accept a client's first `MessagePacket` as its name, so older
//   clients that send the name as a plain line keep working.
// - `ExtensionPacket` (any other registered id): an opaque payload for kinds
//   added at process start. Its decoder is whatever was registered for the
//   id; handlers that do not override `handle_extension` refuse it.
//
// Handlers return `ControlFlow`: `Continue` keeps the read loop going,
// `Break` asks the caller to close the connection gracefully. Errors are for
// packets that cannot be acted on and are fatal for that connection only.
//
// See also: `registry.rs` for the type id → decoder table, `codec.rs` for the
// primitive encodings.

use std::io::Read;
use std::ops::ControlFlow;

use crate::codec::{put_string, put_u32, read_string};
use crate::error::{HandlingError, PacketError};
use crate::types::PacketTypeId;

/// Outcome of handling one packet.
pub type Handled = Result<ControlFlow<()>, HandlingError>;

/// A chat line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessagePacket {
    pub text: String,
}

/// Notice that the sender is terminating the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectPacket {
    pub reason: String,
}

/// Display name handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityPacket {
    pub name: String,
}

impl MessagePacket {
    pub const TYPE_ID: PacketTypeId = PacketTypeId(0);

    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<(), PacketError> {
        put_string(buf, &self.text)
    }

    pub fn decode(cursor: &mut dyn Read) -> Result<Packet, PacketError> {
        Ok(Packet::Message(Self {
            text: read_string(cursor)?,
        }))
    }
}

impl DisconnectPacket {
    pub const TYPE_ID: PacketTypeId = PacketTypeId(1);

    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<(), PacketError> {
        put_string(buf, &self.reason)
    }

    pub fn decode(cursor: &mut dyn Read) -> Result<Packet, PacketError> {
        Ok(Packet::Disconnect(Self {
            reason: read_string(cursor)?,
        }))
    }
}

impl IdentityPacket {
    pub const TYPE_ID: PacketTypeId = PacketTypeId(2);

    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) -> Result<(), PacketError> {
        put_string(buf, &self.name)
    }

    pub fn decode(cursor: &mut dyn Read) -> Result<Packet, PacketError> {
        Ok(Packet::Identity(Self {
            name: read_string(cursor)?,
        }))
    }
}

/// A packet of a kind registered outside the built-in set. `payload` is the
/// raw payload exactly as it appears on the wire after the type id, so the
/// frame re-encodes byte for byte.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionPacket {
    pub id: PacketTypeId,
    pub payload: Vec<u8>,
}

impl ExtensionPacket {
    pub fn new(id: PacketTypeId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }
}

/// Any packet the protocol can carry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Message(MessagePacket),
    Disconnect(DisconnectPacket),
    Identity(IdentityPacket),
    Extension(ExtensionPacket),
}

impl Packet {
    /// Shorthand for `Packet::Message(MessagePacket::new(text))`.
    pub fn message(text: impl Into<String>) -> Self {
        Packet::Message(MessagePacket::new(text))
    }

    /// Shorthand for `Packet::Disconnect(DisconnectPacket::new(reason))`.
    pub fn disconnect(reason: impl Into<String>) -> Self {
        Packet::Disconnect(DisconnectPacket::new(reason))
    }

    /// Shorthand for `Packet::Identity(IdentityPacket::new(name))`.
    pub fn identity(name: impl Into<String>) -> Self {
        Packet::Identity(IdentityPacket::new(name))
    }

    pub fn type_id(&self) -> PacketTypeId {
        match self {
            Packet::Message(_) => MessagePacket::TYPE_ID,
            Packet::Disconnect(_) => DisconnectPacket::TYPE_ID,
            Packet::Identity(_) => IdentityPacket::TYPE_ID,
            Packet::Extension(p) => p.id,
        }
    }

    /// Encode a full frame: big-endian type id, then the payload.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let mut buf = Vec::new();
        put_u32(&mut buf, self.type_id().0);
        match self {
            Packet::Message(p) => p.encode_payload(&mut buf)?,
            Packet::Disconnect(p) => p.encode_payload(&mut buf)?,
            Packet::Identity(p) => p.encode_payload(&mut buf)?,
            Packet::Extension(p) => buf.extend_from_slice(&p.payload),
        }
        Ok(buf)
    }

    /// Route this packet to its handling method.
    pub fn handle<H: PacketHandler + ?Sized>(self, handler: &mut H) -> Handled {
        match self {
            Packet::Message(p) => handler.handle_message(p),
            Packet::Disconnect(p) => handler.handle_disconnect(p),
            Packet::Identity(p) => handler.handle_identity(p),
            Packet::Extension(p) => handler.handle_extension(p),
        }
    }
}

/// One handling operation per packet kind. Server and client each implement
/// this for the packets they expect to receive.
pub trait PacketHandler {
    fn handle_message(&mut self, packet: MessagePacket) -> Handled;

    fn handle_disconnect(&mut self, packet: DisconnectPacket) -> Handled;

    fn handle_identity(&mut self, packet: IdentityPacket) -> Handled;

    /// Extension kinds are refused unless the handler knows them.
    fn handle_extension(&mut self, packet: ExtensionPacket) -> Handled {
        Err(HandlingError::Rejected(format!(
            "no handler for packet type {}",
            packet.id
        )))
    }
}
