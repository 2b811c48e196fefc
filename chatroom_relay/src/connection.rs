// One accepted server-side socket.
//
// A `Connection` is the shared half of a client's socket: its id, peer
// address, and a mutex-guarded write handle. The read half is not here; it is
// owned exclusively by the connection's worker (`handler.rs`), so reads never
// contend with anything.
//
// Writers come from many threads: every other connection's worker may
// broadcast to this one. The write mutex keeps whole frames from
// interleaving. A write timeout (set by the server from config) bounds how
// long a slow reader can hold a broadcaster up. Any failed write closes the
// connection: the peer may have received part of a frame, and with no length
// prefix its stream cannot be realigned. Closing also unblocks the
// connection's own worker, which then removes it and announces the leave.
//
// Ownership: the worker holds the only long-lived `Arc<Connection>`. The
// registry holds a `Weak`, so membership never keeps a dead socket alive.
//
// `close` shuts the socket down in both directions. That unblocks the
// worker's pending read immediately, which is how the server cancels a
// connection from another thread.

use std::fmt;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chatroom_protocol::{Packet, PacketError};
use tracing::debug;

/// Server-assigned connection id, unique for the life of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    writer: Mutex<TcpStream>,
    shutdown_handle: TcpStream,
    closed: AtomicBool,
}

impl Connection {
    /// Wrap the write side of an accepted socket. The caller keeps its own
    /// clone of the stream for reading.
    pub fn new(id: ConnectionId, peer: SocketAddr, stream: TcpStream) -> io::Result<Self> {
        let shutdown_handle = stream.try_clone()?;
        Ok(Self {
            id,
            peer,
            writer: Mutex::new(stream),
            shutdown_handle,
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Write an already-encoded frame.
    pub fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writer.write_all(frame).and_then(|()| writer.flush()) {
            // Part of the frame may already be on the wire and frames carry no
            // length, so the stream can never be resynchronized.
            debug!(connection = %self.id, error = %e, "write failed, closing");
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Encode and write a single packet.
    pub fn send(&self, packet: &Packet) -> Result<(), PacketError> {
        let frame = packet.encode()?;
        self.send_frame(&frame)?;
        Ok(())
    }

    /// Shut the socket down in both directions. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Goes through its own handle, not the write lock, so a write blocked
        // on a slow peer is aborted rather than waited out.
        match self.shutdown_handle.shutdown(Shutdown::Both) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => debug!(connection = %self.id, error = %e, "shutdown failed"),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
