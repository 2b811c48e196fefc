// TCP listener and worker threads for the chat relay.
//
// Architecture: thread per connection, one shared registry.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections, assigns each a `ConnectionId`, applies the write timeout,
//   and spawns a worker. The listener is non-blocking so the loop can notice
//   `keep_running` going false between accepts.
// - **Worker threads** (one per client): each runs a `ConnectionHandler`,
//   which reads frames from its own socket and writes to others through the
//   `ConnectionRegistry`. A blocked or slow client only ever blocks its own
//   worker (and, for at most the write timeout, a broadcaster writing to it).
//
// Shutdown (`ServerHandle::stop`): the listener stops accepting, the registry
// sends every member `DisconnectPacket("Server shutting down")` and closes its
// socket, which unblocks each worker's read, and the workers are joined.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chatroom_protocol::PacketRegistry;
use tracing::{debug, info, warn};

use crate::config::{ChatPolicy, ServerConfig};
use crate::connection::{Connection, ConnectionId};
use crate::handler::ConnectionHandler;
use crate::registry::ConnectionRegistry;

/// Reason sent to every client when the server stops.
pub const SHUTDOWN_REASON: &str = "Server shutting down";

/// How long the listener sleeps when no connection is waiting.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Handle returned by `start_server` to observe and stop the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    registry: Arc<ConnectionRegistry>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Number of connections currently registered.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Signal the server to stop and wait for every worker to finish.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
    }
}

/// Start the server on a background thread with the standard packet kinds.
/// Returns a handle for stopping it and the actual bound address (useful
/// when port 0 is used to let the OS pick a free port).
pub fn start_server(config: ServerConfig) -> io::Result<(ServerHandle, SocketAddr)> {
    start_server_with(config, Arc::new(PacketRegistry::standard()))
}

/// Start the server with a caller-built packet registry.
pub fn start_server_with(
    config: ServerConfig,
    packets: Arc<PacketRegistry>,
) -> io::Result<(ServerHandle, SocketAddr)> {
    let listener = TcpListener::bind(config.bind_address())?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let keep_running = Arc::new(AtomicBool::new(true));
    let registry = Arc::new(ConnectionRegistry::new());

    let listener_state = Listener {
        listener,
        registry: Arc::clone(&registry),
        packets,
        policy: config.policy(),
        write_timeout: config.write_timeout(),
        keep_running: Arc::clone(&keep_running),
    };
    let thread = thread::Builder::new()
        .name("chatroom-listener".into())
        .spawn(move || listener_state.run())?;

    info!(%addr, "chat relay listening");
    Ok((
        ServerHandle {
            keep_running,
            registry,
            thread: Some(thread),
        },
        addr,
    ))
}

struct Listener {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    packets: Arc<PacketRegistry>,
    policy: ChatPolicy,
    write_timeout: Option<Duration>,
    keep_running: Arc<AtomicBool>,
}

impl Listener {
    fn run(self) {
        let mut next_id = 0u64;
        let mut workers: Vec<Worker> = Vec::new();

        while self.keep_running.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    let id = ConnectionId(next_id);
                    next_id += 1;
                    match self.spawn_worker(id, stream, peer) {
                        Ok(worker) => workers.push(worker),
                        Err(e) => warn!(%peer, error = %e, "failed to start connection worker"),
                    }
                    workers.retain(|worker| !worker.thread.is_finished());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        info!(connections = self.registry.len(), "chat relay shutting down");
        self.registry.close_all(SHUTDOWN_REASON);
        // A worker accepted just before shutdown may not have registered yet.
        for worker in workers {
            if let Some(connection) = worker.connection.upgrade() {
                connection.close();
            }
            let _ = worker.thread.join();
        }
    }

    fn spawn_worker(
        &self,
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> io::Result<Worker> {
        // Accepted sockets can inherit the listener's non-blocking flag.
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(self.write_timeout)?;
        let read_half = stream.try_clone()?;
        let connection = Arc::new(Connection::new(id, peer, stream)?);
        debug!(connection = %id, %peer, "accepted");

        let weak = Arc::downgrade(&connection);
        let handler = ConnectionHandler::new(
            connection,
            read_half,
            Arc::clone(&self.registry),
            Arc::clone(&self.packets),
            self.policy,
        );
        let thread = thread::Builder::new()
            .name(format!("chatroom-conn-{}", id.0))
            .spawn(move || handler.run())?;
        Ok(Worker {
            thread,
            connection: weak,
        })
    }
}

struct Worker {
    thread: JoinHandle<()>,
    connection: Weak<Connection>,
}
