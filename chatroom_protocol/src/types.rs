// Core ID types for the chat protocol.
//
// `PacketTypeId` is the 4-byte identifier that prefixes every frame on the
// wire. It is a newtype rather than a bare `u32` so that registry lookups and
// error messages cannot confuse it with a string length prefix, which shares
// the same wire representation.

use std::fmt;

/// Numeric packet kind identifier, written big-endian at the start of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketTypeId(pub u32);

impl fmt::Display for PacketTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
