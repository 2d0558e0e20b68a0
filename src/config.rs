use crate::error::{RelayError, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP/WebSocket server configuration
    pub server: ServerConfig,
    /// Per-connection timing and buffer limits
    pub connection: ConnectionConfig,
    /// Size of the registry's intake channels
    pub intake_buffer: usize,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address as host:port (default: 0.0.0.0:8888)
    pub addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Time allowed to write one frame to the peer
    pub write_wait: Duration,
    /// Time allowed between keepalive acknowledgments from the peer
    pub pong_wait: Duration,
    /// Keepalive probe period, must be less than `pong_wait`
    pub ping_period: Duration,
    /// Maximum inbound message size in bytes
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue
    pub send_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            send_buffer: 256,
        }
    }
}

impl ConnectionConfig {
    /// Check the invariants between the configured limits
    pub fn validate(&self) -> Result<()> {
        if self.ping_period.is_zero() {
            return Err(RelayError::InvalidConfig(
                "ping period must be greater than zero".into(),
            ));
        }
        if self.ping_period >= self.pong_wait {
            return Err(RelayError::InvalidConfig(format!(
                "ping period ({:?}) must be less than pong wait ({:?})",
                self.ping_period, self.pong_wait
            )));
        }
        if self.write_wait.is_zero() {
            return Err(RelayError::InvalidConfig(
                "write wait must be greater than zero".into(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(RelayError::InvalidConfig(
                "max message size must be greater than zero".into(),
            ));
        }
        if self.send_buffer == 0 {
            return Err(RelayError::InvalidConfig(
                "send buffer must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = ConnectionConfig::default();

        let pong_wait = parse_secs("RELAY_PONG_WAIT_SECS", defaults.pong_wait)?;
        // The probe period follows the pong wait unless set explicitly.
        let ping_period = parse_secs("RELAY_PING_PERIOD_SECS", pong_wait * 9 / 10)?;

        let connection = ConnectionConfig {
            write_wait: parse_secs("RELAY_WRITE_WAIT_SECS", defaults.write_wait)?,
            pong_wait,
            ping_period,
            max_message_size: parse_usize("RELAY_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            send_buffer: parse_usize("RELAY_SEND_BUFFER", defaults.send_buffer)?,
        };
        connection.validate()?;

        let intake_buffer = parse_usize("RELAY_INTAKE_BUFFER", 256)?;
        if intake_buffer == 0 {
            return Err(RelayError::InvalidConfig(
                "RELAY_INTAKE_BUFFER must be greater than zero".into(),
            ));
        }

        Ok(Config {
            server: ServerConfig {
                addr: get_env_or("RELAY_ADDR", "0.0.0.0:8888"),
            },
            connection,
            intake_buffer,
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Replace the listen address (used for the `--addr` flag)
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.server.addr = addr.into();
        self
    }
}

fn parse_secs(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
            RelayError::InvalidConfig(format!("{} must be a whole number of seconds", key))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| RelayError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
