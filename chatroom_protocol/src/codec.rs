// Primitive wire encodings shared by every packet payload.
//
// Frames carry no overall length: a frame is a 4-byte big-endian type id
// followed by a payload that must be self-delimiting, so each decoder leaves
// the cursor exactly at the next frame boundary. Strings are the only
// variable-length primitive: a 4-byte big-endian byte count, then that many
// bytes of UTF-8.
//
// Writers append to a `Vec<u8>` so a packet is encoded once and the same
// bytes can be handed to many sockets. Readers work on any `Read`, including
// `&mut dyn Read`, which is what the registry's decoder table uses.
//
// `MAX_STRING_BYTES` (1 MB) bounds allocation from a hostile length prefix.
// The same limit is enforced on encode so we never emit a frame the peer
// would refuse.

use std::io::{self, Read};

use crate::error::PacketError;

/// Largest string payload accepted on encode or decode, in bytes.
pub const MAX_STRING_BYTES: u32 = 1024 * 1024;

/// Append a big-endian `u32`.
pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Append a length-prefixed UTF-8 string.
pub fn put_string(buf: &mut Vec<u8>, value: &str) -> Result<(), PacketError> {
    let len = value.len();
    if len > MAX_STRING_BYTES as usize {
        return Err(PacketError::StringTooLong {
            len,
            max: MAX_STRING_BYTES,
        });
    }
    put_u32(buf, len as u32);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

/// Read a big-endian `u32`. Returns `UnexpectedEof` if the stream ends first.
pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Read the type id that starts a frame.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte,
/// which is how a peer closing between frames looks. Ending partway through
/// the id is `UnexpectedEof`.
pub fn read_frame_start<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<u32>> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < bytes.len() {
        match reader.read(&mut bytes[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(u32::from_be_bytes(bytes)))
}

/// Read a length-prefixed UTF-8 string.
pub fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<String, PacketError> {
    let len = read_u32(reader)?;
    if len > MAX_STRING_BYTES {
        return Err(PacketError::StringTooLong {
            len: len as usize,
            max: MAX_STRING_BYTES,
        });
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}
