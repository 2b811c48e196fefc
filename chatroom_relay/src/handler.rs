// Per-connection server logic.
//
// Two layers:
// - `ServerPacketHandler` implements `PacketHandler` for packets a client
//   sends. It owns the connection's identity (`UserModel`) and turns chat
//   lines into broadcasts through the shared `ConnectionRegistry`.
// - `ConnectionHandler` is the worker that owns one socket's read half and
//   drives the lifecycle:
//
//     Connecting ──activate──▶ Active ──peer close / transport error──▶ Disconnecting ─┐
//                                 │                                                    ├─▶ Closed
//                                 └──protocol / handling error──────────▶ Error ───────┘
//
//   `Active` carries the packet handler; the two exit phases carry whatever
//   identity had been established, which the leave notice needs. `Closed`
//   carries nothing. "Not yet started" and "torn down" are distinct variants.
//
// Ordering on the way out matters: the connection is removed from the
// registry *before* the leave notice is broadcast, so the leaver never sees
// its own notice. On the error path the peer is first sent a
// `DisconnectPacket` and its socket closed; then the normal exit runs.
//
// Identity: a client names itself either with an `IdentityPacket` or, as
// older clients do, by sending its name as its first `MessagePacket`. Both
// go through `establish_identity`.

use std::io::BufReader;
use std::net::TcpStream;
use std::ops::ControlFlow;
use std::sync::Arc;

use chatroom_protocol::{
    DisconnectPacket, Handled, HandlingError, IdentityPacket, MessagePacket, Packet,
    PacketHandler, PacketRegistry,
};
use tracing::{debug, error, info};

use crate::config::ChatPolicy;
use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::registry::ConnectionRegistry;

/// Reason sent to a client whose connection is torn down after an error.
pub const ERROR_DISCONNECT_REASON: &str = "Error in connection worker, check server console.";

/// The identity a connection chats under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserModel {
    pub username: String,
}

pub struct ServerPacketHandler {
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    policy: ChatPolicy,
    user: Option<UserModel>,
}

impl ServerPacketHandler {
    pub fn new(
        connection: Arc<Connection>,
        registry: Arc<ConnectionRegistry>,
        policy: ChatPolicy,
    ) -> Self {
        Self {
            connection,
            registry,
            policy,
            user: None,
        }
    }

    pub fn user(&self) -> Option<&UserModel> {
        self.user.as_ref()
    }

    pub fn take_user(&mut self) -> Option<UserModel> {
        self.user.take()
    }

    fn establish_identity(&mut self, name: String) -> Handled {
        let username = name.trim().to_string();
        if username.is_empty() {
            return Err(HandlingError::Rejected("display name must not be empty".into()));
        }
        info!("Connection: {}/{}", username, self.connection.peer());
        if self.policy.announce_joins {
            let notice = Packet::message(format!("{username} joined the chat"));
            self.registry
                .broadcast_except(&notice, self.connection.id())?;
        }
        self.user = Some(UserModel { username });
        Ok(ControlFlow::Continue(()))
    }

    fn relay_chat(&self, username: &str, text: &str) -> Handled {
        let line = Packet::message(format!("{username}: {text}"));
        if self.policy.echo_to_sender {
            self.registry.broadcast(&line)?;
        } else {
            self.registry
                .broadcast_except(&line, self.connection.id())?;
        }
        Ok(ControlFlow::Continue(()))
    }
}

impl PacketHandler for ServerPacketHandler {
    fn handle_message(&mut self, packet: MessagePacket) -> Handled {
        if let Some(user) = &self.user {
            return self.relay_chat(&user.username, &packet.text);
        }
        self.establish_identity(packet.text)
    }

    fn handle_disconnect(&mut self, packet: DisconnectPacket) -> Handled {
        debug!(connection = %self.connection.id(), reason = %packet.reason, "client disconnecting");
        Ok(ControlFlow::Break(()))
    }

    fn handle_identity(&mut self, packet: IdentityPacket) -> Handled {
        if let Some(user) = &self.user {
            return Err(HandlingError::Rejected(format!(
                "already identified as {}",
                user.username
            )));
        }
        self.establish_identity(packet.name)
    }
}

/// Lifecycle of one server-side connection.
pub enum ConnectionPhase {
    Connecting,
    Active(ServerPacketHandler),
    Disconnecting(Option<UserModel>),
    Error(Option<UserModel>),
    Closed,
}

impl ConnectionPhase {
    fn name(&self) -> &'static str {
        match self {
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Active(_) => "active",
            ConnectionPhase::Disconnecting(_) => "disconnecting",
            ConnectionPhase::Error(_) => "error",
            ConnectionPhase::Closed => "closed",
        }
    }
}

pub struct ConnectionHandler {
    connection: Arc<Connection>,
    reader: BufReader<TcpStream>,
    registry: Arc<ConnectionRegistry>,
    packets: Arc<PacketRegistry>,
    policy: ChatPolicy,
    phase: ConnectionPhase,
}

impl ConnectionHandler {
    pub fn new(
        connection: Arc<Connection>,
        read_half: TcpStream,
        registry: Arc<ConnectionRegistry>,
        packets: Arc<PacketRegistry>,
        policy: ChatPolicy,
    ) -> Self {
        Self {
            connection,
            reader: BufReader::new(read_half),
            registry,
            packets,
            policy,
            phase: ConnectionPhase::Connecting,
        }
    }

    /// Drive the connection from activation to close. Blocks the calling
    /// thread until the peer goes away or the connection fails.
    pub fn run(mut self) {
        self.on_active();
        while matches!(self.phase, ConnectionPhase::Active(_)) {
            self.receive_one();
        }
        self.on_inactive();
    }

    /// Switch phase, returning the one being left.
    fn enter(&mut self, next: ConnectionPhase) -> ConnectionPhase {
        debug!(
            connection = %self.connection.id(),
            from = self.phase.name(),
            to = next.name(),
            "phase change"
        );
        std::mem::replace(&mut self.phase, next)
    }

    /// Leave `Active`, carrying the established identity into `exit`.
    fn exit_active(&mut self, exit: fn(Option<UserModel>) -> ConnectionPhase) {
        let user = match &mut self.phase {
            ConnectionPhase::Active(handler) => handler.take_user(),
            _ => None,
        };
        self.enter(exit(user));
    }

    fn on_active(&mut self) {
        self.registry.add(&self.connection);
        let handler = ServerPacketHandler::new(
            Arc::clone(&self.connection),
            Arc::clone(&self.registry),
            self.policy,
        );
        self.enter(ConnectionPhase::Active(handler));
    }

    /// Read one frame and dispatch it, moving to an exit phase on failure.
    fn receive_one(&mut self) {
        let ConnectionPhase::Active(handler) = &mut self.phase else {
            return;
        };
        match read_and_dispatch(&mut self.reader, &self.packets, handler) {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => self.exit_active(ConnectionPhase::Disconnecting),
            Err(ConnectionError::Transport(e)) => {
                debug!(connection = %self.connection.id(), error = %e, "transport closed");
                self.exit_active(ConnectionPhase::Disconnecting);
            }
            Err(err) => {
                self.exit_active(ConnectionPhase::Error);
                self.on_error(&err);
            }
        }
    }

    fn on_error(&self, err: &ConnectionError) {
        error!(
            connection = %self.connection.id(),
            peer = %self.connection.peer(),
            error = %err,
            "exception caught on connection worker"
        );
        if err.notifies_peer() {
            if let Err(e) = self.connection.send(&Packet::disconnect(ERROR_DISCONNECT_REASON)) {
                debug!(connection = %self.connection.id(), error = %e, "disconnect notice not delivered");
            }
        }
        self.connection.close();
    }

    fn on_inactive(&mut self) {
        let user = match self.enter(ConnectionPhase::Closed) {
            ConnectionPhase::Disconnecting(user) | ConnectionPhase::Error(user) => user,
            ConnectionPhase::Active(mut handler) => handler.take_user(),
            ConnectionPhase::Connecting | ConnectionPhase::Closed => None,
        };
        self.registry.remove(self.connection.id());
        self.connection.close();

        if let Some(user) = user {
            info!("Disconnection: {}/{}", user.username, self.connection.peer());
            let notice = Packet::message(format!("{} left the chat", user.username));
            if let Err(e) = self.registry.broadcast(&notice) {
                error!(error = %e, "leave notice could not be encoded");
            }
        }
    }
}

fn read_and_dispatch(
    reader: &mut BufReader<TcpStream>,
    packets: &PacketRegistry,
    handler: &mut ServerPacketHandler,
) -> Result<ControlFlow<()>, ConnectionError> {
    let Some(packet) = packets.read_packet(reader)? else {
        return Ok(ControlFlow::Break(()));
    };
    Ok(packet.handle(handler)?)
}
