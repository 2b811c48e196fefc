// TCP client for connecting to the chat relay.
//
// `ChatClient` is the connection manager a host application (a game client,
// a terminal) embeds. Architecture:
// - `connect()` resolves and connects on the calling thread, sends the
//   display name as an `IdentityPacket` before anything else, then spawns a
//   background receive thread.
// - The receive thread blocks on `read_packet()` and pushes each chat line to
//   the host's `ChatUi`, prefixed with `[ChatRoom] `. Lines that arrive while
//   the host has no local display name (no player in the world) are dropped,
//   not queued.
// - The calling thread keeps a `BufWriter<TcpStream>` for sending.
//
// When the receive loop ends on its own (server closed, server sent a
// `DisconnectPacket`, read or decode failure), it shuts the socket down in
// both directions, clears `connected`, and tells the UI why. If the shutdown
// itself fails that double fault is logged on its own and surfaced to the UI
// as one extra line. A local `disconnect()` ends the loop quietly.
//
// A failed `send_message` write also ends the session: part of the frame may
// have gone out, and frames carry no length, so the stream is unusable. The
// socket is shut down, which wakes the receive thread to report the loss.
//
// The client never reconnects. Retrying is the host's decision.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use chatroom_protocol::{
    DisconnectPacket, Handled, HandlingError, IdentityPacket, MessagePacket, Packet,
    PacketHandler, PacketRegistry,
};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Prefix put in front of every line handed to the UI.
pub const CHAT_PREFIX: &str = "[ChatRoom] ";

/// UI line shown when cleaning up after a failure also fails.
pub const CLEANUP_FAILURE_LINE: &str =
    "[ChatRoom] An exception raised while closing reader and writer, see logs";

/// Reason sent to the server on a local disconnect.
pub const CLIENT_DISCONNECT_REASON: &str = "Client disconnected";

/// What the client needs from the application hosting it.
pub trait ChatUi: Send + Sync {
    /// Display one already-formatted chat line.
    fn on_chat_line_received(&self, line: &str);

    /// The name of the local player, or `None` when there is nobody to show
    /// chat to.
    fn local_display_name(&self) -> Option<String>;

    /// The session ended for a reason other than a local `disconnect()`.
    fn on_connection_lost(&self, reason: &str);
}

#[derive(Debug)]
struct SessionFlags {
    connected: AtomicBool,
    closing: AtomicBool,
    /// Set when a local write failed; reported instead of the read-side reason.
    write_failure: Mutex<Option<String>>,
}

/// Shuts the socket down when the session ends on its own.
type ShutdownFn = fn(&TcpStream) -> io::Result<()>;

/// A live client session.
#[derive(Debug)]
pub struct ChatClient {
    writer: BufWriter<TcpStream>,
    stream: TcpStream,
    peer: SocketAddr,
    flags: Arc<SessionFlags>,
    reader_thread: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Connect with the standard packet kinds and default timeouts.
    pub fn connect<A: ToSocketAddrs>(addr: A, ui: Arc<dyn ChatUi>) -> Result<Self, ClientError> {
        Self::connect_with(
            addr,
            ui,
            Arc::new(PacketRegistry::standard()),
            &ClientConfig::default(),
        )
    }

    /// Connect, identify, and start the receive thread.
    pub fn connect_with<A: ToSocketAddrs>(
        addr: A,
        ui: Arc<dyn ChatUi>,
        packets: Arc<PacketRegistry>,
        config: &ClientConfig,
    ) -> Result<Self, ClientError> {
        let name = ui.local_display_name().ok_or(ClientError::NoDisplayName)?;
        let stream = open_stream(addr, config)?;
        stream.set_write_timeout(config.write_timeout)?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;

        let reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream.try_clone()?);
        send_packet(&mut writer, &Packet::identity(name.as_str()))?;
        info!(%peer, %name, "connected to chat relay");

        let flags = Arc::new(SessionFlags {
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            write_failure: Mutex::new(None),
        });
        let loop_flags = Arc::clone(&flags);
        let reader_thread = thread::Builder::new()
            .name("chatroom-receive".into())
            .spawn(move || receive_loop(reader, packets, ui, loop_flags, shutdown_quietly))?;

        Ok(Self {
            writer,
            stream,
            peer,
            flags,
            reader_thread: Some(reader_thread),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.flags.connected.load(Ordering::SeqCst)
    }

    /// Send a chat line.
    pub fn send_message(&mut self, text: &str) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        match send_packet(&mut self.writer, &Packet::message(text)) {
            Err(ClientError::Io(e)) => {
                self.abandon_after_write_failure(&e);
                Err(ClientError::Io(e))
            }
            other => other,
        }
    }

    /// A write failed, possibly partway through a frame. The stream cannot be
    /// realigned, so end the session; the receive thread reports the loss.
    fn abandon_after_write_failure(&self, err: &io::Error) {
        warn!(peer = %self.peer, error = %err, "chat write failed, closing connection");
        *self
            .flags
            .write_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(format!("send failed: {err}"));
        self.flags.connected.store(false, Ordering::SeqCst);
        if let Err(e) = shutdown_quietly(&self.stream) {
            debug!(error = %e, "shutdown after write failure");
        }
    }

    /// Tell the server we are leaving, close the socket, and wait for the
    /// receive thread. Idempotent.
    pub fn disconnect(&mut self) {
        self.flags.closing.store(true, Ordering::SeqCst);
        if self.flags.connected.swap(false, Ordering::SeqCst) {
            if let Err(e) = send_packet(&mut self.writer, &Packet::disconnect(CLIENT_DISCONNECT_REASON)) {
                debug!(error = %e, "goodbye not delivered");
            }
        }
        if let Err(e) = shutdown_quietly(&self.stream) {
            warn!(error = %e, "failed to close chat connection");
        }
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn open_stream<A: ToSocketAddrs>(addr: A, config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let mut last_err = None;
    let mut tried = Vec::new();
    for candidate in addr.to_socket_addrs().map_err(ClientError::Connect)? {
        tried.push(candidate.to_string());
        match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    match last_err {
        Some(e) => Err(ClientError::Connect(e)),
        None => Err(ClientError::Unresolved(tried.join(", "))),
    }
}

fn send_packet(writer: &mut BufWriter<TcpStream>, packet: &Packet) -> Result<(), ClientError> {
    let frame = packet.encode()?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Shut both directions down, treating an already-closed socket as success.
fn shutdown_quietly(stream: &TcpStream) -> io::Result<()> {
    match stream.shutdown(Shutdown::Both) {
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// Routes server packets to the UI.
struct ClientPacketHandler<'a> {
    ui: &'a dyn ChatUi,
    disconnect_reason: Option<String>,
}

impl PacketHandler for ClientPacketHandler<'_> {
    fn handle_message(&mut self, packet: MessagePacket) -> Handled {
        if self.ui.local_display_name().is_none() {
            debug!("no local player, dropping chat line");
            return Ok(ControlFlow::Continue(()));
        }
        self.ui
            .on_chat_line_received(&format!("{CHAT_PREFIX}{}", packet.text));
        Ok(ControlFlow::Continue(()))
    }

    fn handle_disconnect(&mut self, packet: DisconnectPacket) -> Handled {
        self.disconnect_reason = Some(packet.reason);
        Ok(ControlFlow::Break(()))
    }

    fn handle_identity(&mut self, _packet: IdentityPacket) -> Handled {
        Err(HandlingError::Rejected(
            "server sent an identity packet".into(),
        ))
    }
}

/// Receive thread: read packets until the session ends, then clean up.
fn receive_loop(
    mut reader: BufReader<TcpStream>,
    packets: Arc<PacketRegistry>,
    ui: Arc<dyn ChatUi>,
    flags: Arc<SessionFlags>,
    shutdown: ShutdownFn,
) {
    let mut handler = ClientPacketHandler {
        ui: ui.as_ref(),
        disconnect_reason: None,
    };
    let reason = loop {
        match packets.read_packet(&mut reader) {
            Ok(Some(packet)) => match packet.handle(&mut handler) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => {
                    break handler
                        .disconnect_reason
                        .take()
                        .unwrap_or_else(|| "disconnected by server".into());
                }
                Err(e) => break format!("bad packet from server: {e}"),
            },
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) => break format!("connection error: {e}"),
        }
    };

    flags.connected.store(false, Ordering::SeqCst);
    if flags.closing.load(Ordering::SeqCst) {
        debug!("receive loop ended by local disconnect");
        return;
    }

    let reason = flags
        .write_failure
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .unwrap_or(reason);
    info!(%reason, "chat connection lost");
    if let Err(e) = shutdown(reader.get_ref()) {
        error!(error = %e, "An exception raised while closing reader and writer");
        ui.on_chat_line_received(CLEANUP_FAILURE_LINE);
    }
    ui.on_connection_lost(&reason);
}
