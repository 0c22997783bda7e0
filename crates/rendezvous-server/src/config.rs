//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the signaling server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `6033`, `0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub max_send_queue: usize,
    /// Interval between pings sent to each connection.
    pub heartbeat_interval_secs: u64,
    /// A connection silent for longer than this is considered dead.
    pub client_timeout_secs: u64,
    /// How often dead connections are swept.
    pub cleanup_interval_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 6033,
            max_send_queue: 64,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cleanup_interval_secs: 60,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 6033);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:6033");
    }

    #[test]
    fn timeout_outlasts_heartbeat() {
        let cfg = ServerConfig::default();
        assert!(cfg.client_timeout() > cfg.heartbeat_interval());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.max_send_queue, 64);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bind_addr(), cfg.bind_addr());
        assert_eq!(back.max_frame_bytes, cfg.max_frame_bytes);
    }
}
