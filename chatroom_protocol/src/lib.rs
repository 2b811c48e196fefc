// chatroom_protocol: binary packet protocol for the chat relay.
//
// This crate defines the packet kinds, their wire encoding, and the registry
// that turns a type id plus a byte cursor back into a typed packet. It is
// shared by the relay server and the client manager (`chatroom_relay`) and has
// no networking of its own.
//
// Module overview:
// - `types.rs`:    `PacketTypeId`, the 4-byte frame prefix.
// - `codec.rs`:    Primitive encodings: big-endian `u32`, length-prefixed
//                  UTF-8 strings, clean-EOF detection at a frame boundary.
// - `packet.rs`:   `MessagePacket`, `DisconnectPacket`, `IdentityPacket`,
//                  `ExtensionPacket`, the `Packet` sum type, and the
//                  `PacketHandler` routing trait.
// - `registry.rs`: `PacketRegistry`, the id → decoder table.
// - `error.rs`:    `PacketError`, `RegistryError`, `HandlingError`.
//
// Design decisions:
// - **Length-implicit frames.** A frame is `[u32 type id][payload]` with no
//   overall length, so every payload must be self-delimiting. A mis-sized
//   payload corrupts every later frame on that stream, which is why decode
//   errors are connection-fatal.
// - **Encode once.** `Packet::encode` returns the whole frame as bytes so a
//   broadcast can write the same buffer to every recipient.
// - **Open for extension.** A kind added at process start registers its id
//   and a decoder producing `Packet::Extension`; handlers opt in by
//   overriding `PacketHandler::handle_extension`.
// - **No async runtime.** Decoders take `&mut dyn Read`, which works for
//   blocking sockets, buffered readers and in-memory cursors alike.

pub mod codec;
pub mod error;
pub mod packet;
pub mod registry;
pub mod types;

pub use codec::MAX_STRING_BYTES;
pub use error::{HandlingError, PacketError, RegistryError};
pub use packet::{
    DisconnectPacket, ExtensionPacket, Handled, IdentityPacket, MessagePacket, Packet,
    PacketHandler,
};
pub use registry::{DecodeFn, PacketKind, PacketRegistry};
pub use types::PacketTypeId;
