// Integration smoke test for the chat relay server.
//
// Starts a relay on localhost and drives it with plain TCP sockets that speak
// the protocol crate's framing directly: identity, chat fan-out with and
// without echo, the legacy first-message login, leaves, a malformed frame,
// and shutdown.
//
// There is no client manager involved here, so every byte the server sends is
// visible to the test. Join announcements double as synchronization points:
// once the room's observer has read "<name> joined the chat", the joiner is
// registered and identified.

use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use chatroom_protocol::{Packet, PacketRegistry};
use chatroom_relay::handler::ERROR_DISCONNECT_REASON;
use chatroom_relay::server::{SHUTDOWN_REASON, ServerHandle};
use chatroom_relay::{ServerConfig, start_server};

struct RawClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    packets: PacketRegistry,
}

impl RawClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Self {
            reader,
            writer: BufWriter::new(stream),
            packets: PacketRegistry::standard(),
        }
    }

    fn send(&mut self, packet: &Packet) {
        self.send_raw(&packet.encode().unwrap());
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    /// Next packet from the server. Panics on EOF or timeout.
    fn recv(&mut self) -> Packet {
        match self.packets.read_packet(&mut self.reader) {
            Ok(Some(packet)) => packet,
            Ok(None) => panic!("server closed the connection"),
            Err(e) => panic!("read failed: {e}"),
        }
    }

    fn recv_text(&mut self) -> String {
        match self.recv() {
            Packet::Message(m) => m.text,
            other => panic!("expected a chat line, got {other:?}"),
        }
    }

    /// True if the server closes the stream (possibly after a reset).
    fn at_eof(&mut self) -> bool {
        match self.packets.read_packet(&mut self.reader) {
            Ok(None) => true,
            Ok(Some(packet)) => panic!("expected EOF, got {packet:?}"),
            Err(e) => e.is_io(),
        }
    }

    /// True if nothing arrives within a short window.
    fn is_quiet(&mut self) -> bool {
        let stream = self.reader.get_ref();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let quiet = match self.packets.read_packet(&mut self.reader) {
            Err(e) => e.is_io(),
            Ok(_) => false,
        };
        self.reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        quiet
    }
}

/// A running relay plus an anonymous observer connection. Anonymous
/// connections are registered and receive broadcasts, so the observer sees
/// every join notice and is used to wait until a join has been processed.
struct Room {
    handle: ServerHandle,
    addr: SocketAddr,
    observer: RawClient,
}

impl Room {
    fn start(echo: bool) -> Self {
        Self::start_with(ServerConfig {
            echo_to_sender: echo,
            ..ServerConfig::default()
        })
    }

    fn start_with(config: ServerConfig) -> Self {
        let config = ServerConfig {
            port: 0, // OS picks a free port
            ..config
        };
        let (handle, addr) = start_server(config).unwrap();
        let observer = RawClient::connect(addr);
        wait_for_count(&handle, 1);
        Self {
            handle,
            addr,
            observer,
        }
    }

    /// Connect without identifying, returning once the server registered it.
    fn connect_anonymous(&self) -> RawClient {
        let before = self.handle.connection_count();
        let client = RawClient::connect(self.addr);
        wait_for_count(&self.handle, before + 1);
        client
    }

    /// Connect and identify. Returns once the join has been announced, so
    /// every later member is guaranteed not to see this one's notice.
    fn join(&mut self, name: &str) -> RawClient {
        let mut client = self.connect_anonymous();
        client.send(&Packet::identity(name));
        assert_eq!(self.observer.recv_text(), format!("{name} joined the chat"));
        client
    }

    /// Alice, bob and carol, all identified and all join notices consumed.
    fn three_users(&mut self) -> [RawClient; 3] {
        let mut alice = self.join("alice");
        let mut bob = self.join("bob");
        assert_eq!(alice.recv_text(), "bob joined the chat");
        let carol = self.join("carol");
        assert_eq!(alice.recv_text(), "carol joined the chat");
        assert_eq!(bob.recv_text(), "carol joined the chat");
        [alice, bob, carol]
    }

    fn count(&self) -> usize {
        self.handle.connection_count()
    }

    fn stop(self) {
        self.handle.stop();
    }
}

/// Poll until the server has exactly `n` registered connections.
fn wait_for_count(handle: &ServerHandle, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.connection_count() != n {
        assert!(
            Instant::now() < deadline,
            "expected {n} connections, have {}",
            handle.connection_count()
        );
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn chat_lines_reach_everyone_but_the_sender() {
    let mut room = Room::start(false);
    let [mut alice, mut bob, mut carol] = room.three_users();

    alice.send(&Packet::message("hi"));
    assert_eq!(bob.recv_text(), "alice: hi");
    assert_eq!(carol.recv_text(), "alice: hi");
    assert!(alice.is_quiet(), "sender received its own line");

    // Lines from one sender arrive in the order they were sent.
    bob.send(&Packet::message("one"));
    bob.send(&Packet::message("two"));
    assert_eq!(alice.recv_text(), "bob: one");
    assert_eq!(alice.recv_text(), "bob: two");
    assert_eq!(carol.recv_text(), "bob: one");
    assert_eq!(carol.recv_text(), "bob: two");

    room.stop();
}

#[test]
fn echo_sends_the_line_back_to_the_sender() {
    let mut room = Room::start(true);
    let [mut alice, mut bob, mut carol] = room.three_users();

    alice.send(&Packet::message("hi"));
    assert_eq!(alice.recv_text(), "alice: hi");
    assert_eq!(bob.recv_text(), "alice: hi");
    assert_eq!(carol.recv_text(), "alice: hi");
    assert!(alice.is_quiet(), "sender received more than one copy");

    room.stop();
}

#[test]
fn first_message_is_accepted_as_the_name() {
    let mut room = Room::start(false);
    let mut alice = room.join("alice");

    let mut legacy = room.connect_anonymous();
    legacy.send(&Packet::message("dave"));
    assert_eq!(alice.recv_text(), "dave joined the chat");

    legacy.send(&Packet::message("hello"));
    assert_eq!(alice.recv_text(), "dave: hello");

    room.stop();
}

#[test]
fn leaving_is_announced_to_the_rest() {
    let mut room = Room::start(false);
    let [mut alice, bob, mut carol] = room.three_users();
    assert_eq!(room.count(), 4);

    drop(bob);
    assert_eq!(alice.recv_text(), "bob left the chat");
    assert_eq!(carol.recv_text(), "bob left the chat");
    wait_for_count(&room.handle, 3);

    // A graceful leave looks the same to everyone else.
    carol.send(&Packet::disconnect("bye"));
    assert_eq!(alice.recv_text(), "carol left the chat");
    assert!(carol.at_eof());
    wait_for_count(&room.handle, 2);

    alice.send(&Packet::message("anyone?"));
    assert!(alice.is_quiet());

    room.stop();
}

#[test]
fn unknown_packet_type_disconnects_only_the_offender() {
    let mut room = Room::start(false);
    let [mut alice, mut bob, mut carol] = room.three_users();

    // A frame whose type id (9999) no one registered.
    bob.send_raw(&9999u32.to_be_bytes());
    assert_eq!(bob.recv(), Packet::disconnect(ERROR_DISCONNECT_REASON));
    assert!(bob.at_eof());

    assert_eq!(alice.recv_text(), "bob left the chat");
    assert_eq!(carol.recv_text(), "bob left the chat");
    wait_for_count(&room.handle, 3);

    alice.send(&Packet::message("still here"));
    assert_eq!(carol.recv_text(), "alice: still here");

    room.stop();
}

#[test]
fn blank_name_is_refused() {
    let mut room = Room::start(false);
    let mut alice = room.join("alice");

    let mut blank = room.connect_anonymous();
    blank.send(&Packet::identity("   "));
    assert_eq!(blank.recv(), Packet::disconnect(ERROR_DISCONNECT_REASON));
    assert!(blank.at_eof());
    wait_for_count(&room.handle, 2);

    assert!(alice.is_quiet(), "refused connection was announced");
    room.stop();
}

#[test]
fn anonymous_connection_leaves_silently() {
    let mut room = Room::start(false);
    let mut alice = room.join("alice");

    let lurker = room.connect_anonymous();
    drop(lurker);
    wait_for_count(&room.handle, 2);

    assert!(alice.is_quiet(), "unidentified leave was announced");
    room.stop();
}

#[test]
fn stop_tells_every_client_and_closes() {
    let mut room = Room::start(false);
    let mut alice = room.join("alice");
    let mut bob = room.join("bob");
    assert_eq!(alice.recv_text(), "bob joined the chat");
    let addr = room.addr;

    room.handle.stop();

    for client in [&mut alice, &mut bob, &mut room.observer] {
        assert_eq!(client.recv(), Packet::disconnect(SHUTDOWN_REASON));
        assert!(client.at_eof());
    }
    assert!(TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_err());
}

#[test]
fn stalled_reader_is_dropped_and_others_stay_framed() {
    let mut room = Room::start_with(ServerConfig {
        write_timeout_ms: Some(200),
        ..ServerConfig::default()
    });
    let [alice, bob, mut carol] = room.three_users();

    // Bob keeps reading on his own thread. Alice never reads again.
    let bob_thread = thread::spawn(move || {
        let mut bob = bob;
        let mut lines = Vec::new();
        loop {
            let text = bob.recv_text();
            if text == "carol: done" {
                return lines;
            }
            lines.push(text);
        }
    });

    let big = "x".repeat(chatroom_protocol::MAX_STRING_BYTES as usize - 64);
    let big_line = format!("carol: {big}");
    let rounds = 48;
    for _ in 0..rounds {
        carol.send(&Packet::message(big.as_str()));
    }
    carol.send(&Packet::message("done"));

    let lines = bob_thread.join().unwrap();
    let big_lines = lines.iter().filter(|l| **l == big_line).count();
    assert_eq!(big_lines, rounds, "bob lost or mangled a line");
    assert!(
        lines.iter().any(|l| l == "alice left the chat"),
        "stalled reader was never dropped"
    );
    assert!(
        lines
            .iter()
            .all(|l| *l == big_line || l == "alice left the chat"),
        "unexpected line"
    );

    // Alice and the observer (also not reading) are gone; bob and carol stay.
    wait_for_count(&room.handle, 2);
    drop(alice);
    room.stop();
}

