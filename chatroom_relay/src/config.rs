// Server and client configuration.
//
// `ServerConfig` is plain data, loadable from a JSON file with any subset of
// fields (missing ones take their `Default`). The CLI (`main.rs`) layers its
// flags on top. `ChatPolicy` is the slice of it the per-connection handler
// needs, copied into each worker so handlers never touch the config itself.
//
// `ClientConfig` has no file form; the client manager is embedded in a host
// application that decides its own timeouts.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Listen port. 0 lets the OS pick one.
    pub port: u16,
    /// Whether a sender also receives its own chat lines.
    pub echo_to_sender: bool,
    /// Whether `"<name> joined the chat"` is broadcast when a connection
    /// identifies itself.
    pub announce_joins: bool,
    /// Upper bound on a single write to one member, in milliseconds. `None`
    /// lets a stalled reader block its broadcasters indefinitely.
    pub write_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7878,
            echo_to_sender: false,
            announce_joins: true,
            write_timeout_ms: Some(5000),
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn policy(&self) -> ChatPolicy {
        ChatPolicy {
            echo_to_sender: self.echo_to_sender,
            announce_joins: self.announce_joins,
        }
    }
}

/// Per-connection chat behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatPolicy {
    pub echo_to_sender: bool,
    pub announce_joins: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = ServerConfig::from_json_str(r#"{"port": 9000, "echo_to_sender": true}"#)
            .unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.echo_to_sender);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.announce_joins);
        assert_eq!(config.write_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn empty_object_is_default() {
        let config = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = ServerConfig::from_json_str("{port: }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_or_null_write_timeout_disables_it() {
        let zero = ServerConfig::from_json_str(r#"{"write_timeout_ms": 0}"#).unwrap();
        assert_eq!(zero.write_timeout(), None);
        let null = ServerConfig::from_json_str(r#"{"write_timeout_ms": null}"#).unwrap();
        assert_eq!(null.write_timeout(), None);
    }

    #[test]
    fn missing_file_is_read_error() {
        let path = std::env::temp_dir().join("chatroom-config-that-does-not-exist.json");
        let err = ServerConfig::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!(
            "chatroom-config-test-{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{"host": "0.0.0.0", "announce_joins": false}"#).unwrap();
        let config = ServerConfig::from_json_file(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:7878");
        assert!(!config.announce_joins);
    }
}
