// chatroom_relay: chat relay server and client connection manager.
//
// The relay is a thin broadcaster: it accepts TCP connections, learns each
// one's display name, and fans every chat line out to the other connected
// users. It keeps no history and runs no commands. The client half of the
// crate is the manager a host application embeds to talk to a relay.
//
// Module overview:
// - `connection.rs`: `Connection`, one accepted socket's write side plus an
//                    out-of-band shutdown handle.
// - `registry.rs`:   `ConnectionRegistry`, the shared set of live
//                    connections, and snapshot-then-send broadcast.
// - `handler.rs`:    Per-connection lifecycle (`ConnectionHandler`) and the
//                    server-side packet routing (`ServerPacketHandler`).
// - `server.rs`:     TCP listener and one worker thread per connection.
// - `client.rs`:     `ChatClient` and the `ChatUi` trait the host implements.
// - `config.rs`:     `ServerConfig` (JSON-loadable), `ClientConfig`.
// - `error.rs`:      `ConnectionError`, `ClientError`, `ConfigError`.
//
// Dependencies: `chatroom_protocol` (packet kinds and framing). Networking is
// blocking `std::net` with a thread per reader; there is no async runtime.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_server`).

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server;

pub use client::{ChatClient, ChatUi};
pub use config::{ChatPolicy, ClientConfig, ServerConfig};
pub use error::{ClientError, ConfigError, ConnectionError};
pub use server::{ServerHandle, start_server, start_server_with};
