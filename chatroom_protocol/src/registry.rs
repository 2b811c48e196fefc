// Packet registry: the type id → decoder table.
//
// The registry is built once at process start (`PacketRegistry::standard()`
// plus any `register` calls for extension kinds) and then shared read-only,
// typically behind an `Arc`, by every connection. Lookup is a plain map from
// `PacketTypeId` to a `PacketKind`, which carries the kind's name (for logs)
// and a decode function. Registration is injective: a second kind claiming
// an id already in the table is refused.
//
// Kinds beyond the built-in three decode to `Packet::Extension`; routing
// them is up to handlers that override `PacketHandler::handle_extension`.
//
// An id that is not in the table is a protocol violation, not a no-op. The
// frame has no length, so the payload cannot be skipped and the rest of the
// stream is unreadable.

use std::collections::BTreeMap;
use std::io::Read;

use crate::codec::read_frame_start;
use crate::error::{PacketError, RegistryError};
use crate::packet::{DisconnectPacket, IdentityPacket, MessagePacket, Packet};
use crate::types::PacketTypeId;

/// Decodes one packet's payload from a cursor positioned just after its id.
pub type DecodeFn = fn(&mut dyn Read) -> Result<Packet, PacketError>;

/// A registered packet kind.
#[derive(Clone, Copy, Debug)]
pub struct PacketKind {
    pub id: PacketTypeId,
    pub name: &'static str,
    pub decode: DecodeFn,
}

const BUILTIN_KINDS: [PacketKind; 3] = [
    PacketKind {
        id: MessagePacket::TYPE_ID,
        name: "message",
        decode: MessagePacket::decode,
    },
    PacketKind {
        id: DisconnectPacket::TYPE_ID,
        name: "disconnect",
        decode: DisconnectPacket::decode,
    },
    PacketKind {
        id: IdentityPacket::TYPE_ID,
        name: "identity",
        decode: IdentityPacket::decode,
    },
];

#[derive(Clone, Debug, Default)]
pub struct PacketRegistry {
    kinds: BTreeMap<PacketTypeId, PacketKind>,
}

impl PacketRegistry {
    /// A registry with no kinds at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding the built-in message, disconnect and identity kinds.
    pub fn standard() -> Self {
        let kinds = BUILTIN_KINDS.iter().map(|kind| (kind.id, *kind)).collect();
        Self { kinds }
    }

    /// Add a kind. Fails if its id is already taken.
    pub fn register(&mut self, kind: PacketKind) -> Result<(), RegistryError> {
        if let Some(existing) = self.kinds.get(&kind.id) {
            return Err(RegistryError::DuplicateTypeId {
                id: kind.id,
                existing: existing.name,
            });
        }
        self.kinds.insert(kind.id, kind);
        Ok(())
    }

    pub fn contains(&self, id: PacketTypeId) -> bool {
        self.kinds.contains_key(&id)
    }

    /// Name of the kind registered under `id`, for diagnostics.
    pub fn name_of(&self, id: PacketTypeId) -> Option<&'static str> {
        self.kinds.get(&id).map(|kind| kind.name)
    }

    /// Look up `id` and decode its payload from `cursor`.
    pub fn create_and_decode(
        &self,
        id: PacketTypeId,
        cursor: &mut dyn Read,
    ) -> Result<Packet, PacketError> {
        let kind = self.kinds.get(&id).ok_or(PacketError::UnknownType(id))?;
        (kind.decode)(cursor)
    }

    /// Read one whole frame: the type id, then the payload.
    ///
    /// Returns `Ok(None)` if the stream ended cleanly between frames.
    pub fn read_packet<R: Read>(&self, reader: &mut R) -> Result<Option<Packet>, PacketError> {
        let Some(raw_id) = read_frame_start(reader)? else {
            return Ok(None);
        };
        self.create_and_decode(PacketTypeId(raw_id), reader).map(Some)
    }
}
