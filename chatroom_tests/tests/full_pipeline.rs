// End-to-end integration tests for the chat pipeline.
//
// Each test starts a real relay server, connects real `ChatClient` instances
// (via `TestChatClient`), and checks what the host UI ends up seeing:
// client → relay → other clients → `ChatUi` callbacks.
//
// Clients identify as soon as they connect, so a client joining right after
// another may or may not see the earlier one's join notice. Tests therefore
// wait for specific lines rather than asserting on whole transcripts.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use chatroom_relay::client::CLEANUP_FAILURE_LINE;
use chatroom_relay::server::{SHUTDOWN_REASON, ServerHandle};
use chatroom_relay::{ClientError, ServerConfig, start_server};
use chatroom_tests::{TestChatClient, UiEvent, wait_until};

fn start_relay(echo: bool) -> (ServerHandle, SocketAddr) {
    let config = ServerConfig {
        port: 0,
        echo_to_sender: echo,
        ..ServerConfig::default()
    };
    start_server(config).unwrap()
}

/// Connect alice then bob, returning once alice has seen bob join.
fn alice_and_bob(addr: SocketAddr) -> (TestChatClient, TestChatClient) {
    let alice = TestChatClient::connect(addr, "alice");
    let bob = TestChatClient::connect(addr, "bob");
    alice.wait_for_line("[ChatRoom] bob joined the chat");
    (alice, bob)
}

#[test]
fn lines_reach_the_other_user_prefixed() {
    let (handle, addr) = start_relay(false);
    let (mut alice, mut bob) = alice_and_bob(addr);

    bob.send("hello");
    alice.wait_for_line("[ChatRoom] bob: hello");

    alice.send("hi bob");
    bob.wait_for_line("[ChatRoom] alice: hi bob");
    assert!(
        !bob.ui.lines().iter().any(|l| l == "[ChatRoom] bob: hello"),
        "sender saw its own line without echo"
    );

    handle.stop();
}

#[test]
fn echo_shows_the_sender_its_own_line() {
    let (handle, addr) = start_relay(true);
    let (alice, mut bob) = alice_and_bob(addr);

    bob.send("hello");
    bob.wait_for_line("[ChatRoom] bob: hello");
    alice.wait_for_line("[ChatRoom] bob: hello");

    handle.stop();
}

#[test]
fn lines_are_dropped_while_there_is_no_local_player() {
    let (handle, addr) = start_relay(false);
    let (alice, mut bob) = alice_and_bob(addr);

    alice.ui.set_display_name(None);
    bob.send("nobody sees this");
    thread::sleep(Duration::from_millis(200));
    alice.ui.set_display_name(Some("alice"));
    bob.send("back again");

    alice.wait_for_line("[ChatRoom] bob: back again");
    assert!(
        !alice
            .ui
            .lines()
            .iter()
            .any(|l| l.contains("nobody sees this")),
        "line was shown with no local player"
    );

    handle.stop();
}

#[test]
fn server_stop_reports_connection_lost() {
    let (handle, addr) = start_relay(false);
    let (mut alice, bob) = alice_and_bob(addr);

    handle.stop();

    assert_eq!(alice.wait_for_connection_lost(), SHUTDOWN_REASON);
    assert_eq!(bob.wait_for_connection_lost(), SHUTDOWN_REASON);
    wait_until("alice to notice", || !alice.is_connected());
    assert!(matches!(
        alice.try_send("too late"),
        Err(ClientError::NotConnected)
    ));

    // Exactly one loss callback, and no cleanup-failure line.
    assert_eq!(alice.ui.lost_reasons().len(), 1);
    assert!(!alice.ui.lines().iter().any(|l| l == CLEANUP_FAILURE_LINE));
}

#[test]
fn local_disconnect_is_quiet_and_announced_to_others() {
    let (handle, addr) = start_relay(false);
    let (mut alice, bob) = alice_and_bob(addr);
    wait_until("both registered", || handle.connection_count() == 2);

    alice.disconnect();
    assert!(!alice.is_connected());
    bob.wait_for_line("[ChatRoom] alice left the chat");
    wait_until("alice to be removed", || handle.connection_count() == 1);

    thread::sleep(Duration::from_millis(100));
    assert!(
        !alice
            .ui
            .events()
            .iter()
            .any(|e| matches!(e, UiEvent::ConnectionLost(_))),
        "local disconnect reported a lost connection"
    );

    handle.stop();
}

#[test]
fn dropping_a_client_leaves_the_room() {
    let (handle, addr) = start_relay(false);
    let (alice, bob) = alice_and_bob(addr);

    drop(alice);
    bob.wait_for_line("[ChatRoom] alice left the chat");
    wait_until("alice to be removed", || handle.connection_count() == 1);

    handle.stop();
}

#[test]
fn connecting_to_a_closed_port_fails() {
    let (handle, addr) = start_relay(false);
    handle.stop();

    let err = TestChatClient::try_connect(addr, "alice").err();
    assert!(matches!(err, Some(ClientError::Connect(_))));
}
