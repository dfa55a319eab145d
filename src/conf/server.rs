use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "ServerConfig::default_host")]
    pub host: String,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// Route the query handler is mounted on.
    #[serde(default = "ServerConfig::default_path")]
    pub path: String,
    /// Upper bound for the liveness probe run while mounting.
    #[serde(
        with = "humantime_serde",
        default = "ServerConfig::default_ping_timeout"
    )]
    pub ping_timeout: Duration,
}

impl ServerConfig {
    fn default_port() -> u16 {
        8080
    }

    fn default_host() -> String {
        String::from("127.0.0.1")
    }

    fn default_path() -> String {
        String::from("/v1/query")
    }

    fn default_ping_timeout() -> Duration {
        Duration::from_secs(5)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            path: Self::default_path(),
            ping_timeout: Self::default_ping_timeout(),
        }
    }
}
