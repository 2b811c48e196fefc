// Test-only chat client for end-to-end integration tests.
//
// Wraps the real `ChatClient` (from `chatroom_relay::client`) around a
// `RecordingUi` that stores every callback it receives, and adds blocking
// wait helpers so tests can say "wait until alice sees this line" instead of
// sleeping and hoping.
//
// The only test-specific code here is the recording UI and the polling loops.
// All networking uses the same code paths as a real host application.
//
// See also: `tests/full_pipeline.rs` for the integration test scenarios.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use chatroom_relay::{ChatClient, ChatUi, ClientError};

/// Default timeout for blocking wait operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One callback the client made into its UI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    Line(String),
    ConnectionLost(String),
}

/// A `ChatUi` that records callbacks and has a settable display name.
#[derive(Debug, Default)]
pub struct RecordingUi {
    display_name: Mutex<Option<String>>,
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingUi {
    pub fn new(display_name: Option<&str>) -> Self {
        Self {
            display_name: Mutex::new(display_name.map(String::from)),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn set_display_name(&self, name: Option<&str>) {
        *self.display_name.lock().unwrap() = name.map(String::from);
    }

    pub fn events(&self) -> MutexGuard<'_, Vec<UiEvent>> {
        self.events.lock().unwrap()
    }

    /// Every chat line received so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                UiEvent::Line(line) => Some(line.clone()),
                UiEvent::ConnectionLost(_) => None,
            })
            .collect()
    }

    pub fn lost_reasons(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                UiEvent::ConnectionLost(reason) => Some(reason.clone()),
                UiEvent::Line(_) => None,
            })
            .collect()
    }
}

impl ChatUi for RecordingUi {
    fn on_chat_line_received(&self, line: &str) {
        self.events().push(UiEvent::Line(line.to_string()));
    }

    fn local_display_name(&self) -> Option<String> {
        self.display_name.lock().unwrap().clone()
    }

    fn on_connection_lost(&self, reason: &str) {
        self.events().push(UiEvent::ConnectionLost(reason.to_string()));
    }
}

/// A test chat participant wrapping a real `ChatClient`.
pub struct TestChatClient {
    client: ChatClient,
    pub ui: Arc<RecordingUi>,
}

impl TestChatClient {
    /// Connect to a relay and identify as `name`.
    pub fn connect(addr: SocketAddr, name: &str) -> Self {
        Self::try_connect(addr, name).expect("TestChatClient::connect failed")
    }

    pub fn try_connect(addr: SocketAddr, name: &str) -> Result<Self, ClientError> {
        let ui = Arc::new(RecordingUi::new(Some(name)));
        let client = ChatClient::connect(addr, Arc::clone(&ui) as Arc<dyn ChatUi>)?;
        Ok(Self { client, ui })
    }

    pub fn send(&mut self, text: &str) {
        self.client.send_message(text).expect("send_message failed");
    }

    pub fn try_send(&mut self, text: &str) -> Result<(), ClientError> {
        self.client.send_message(text)
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Blocking wait until `expected` has been displayed.
    pub fn wait_for_line(&self, expected: &str) {
        let start = Instant::now();
        loop {
            if self.ui.lines().iter().any(|line| line == expected) {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {expected:?}, got {:?}",
                self.ui.lines()
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Blocking wait for the connection-lost callback. Returns its reason.
    pub fn wait_for_connection_lost(&self) -> String {
        let start = Instant::now();
        loop {
            if let Some(reason) = self.ui.lost_reasons().into_iter().next() {
                return reason;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for connection loss"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Blocking wait until `condition` holds.
pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        assert!(start.elapsed() < POLL_TIMEOUT, "timed out waiting for {what}");
        thread::sleep(POLL_INTERVAL);
    }
}
