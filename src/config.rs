//! # Configuration Management
//!
//! Centralized configuration for the transport roles.
//!
//! This module provides structured configuration for stream clients and
//! servers, broadcast peers and the relay, plus transport-wide limits and
//! logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! Durations are written as milliseconds.

use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Max allowed payload size on stream transports (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default port shared by referee box and robots
pub const DEFAULT_PORT: u16 = 4444;

/// Default cipher for encrypted peers
pub const DEFAULT_CIPHER: &str = "xchacha20-poly1305";

/// Main network configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Stream client configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Stream server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Broadcast peer configuration
    #[serde(default)]
    pub peer: PeerConfig,

    /// Relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from `REFBOX_COMM_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("REFBOX_COMM_CLIENT_HOST") {
            self.client.host = host;
        }

        if let Some(port) = env_parse::<u16>("REFBOX_COMM_CLIENT_PORT") {
            self.client.port = port;
        }

        if let Some(val) = env_parse::<u64>("REFBOX_COMM_RECONNECT_DELAY_MS") {
            self.client.reconnect_delay = Duration::from_millis(val);
        }

        if let Ok(addr) = std::env::var("REFBOX_COMM_SERVER_ADDRESS") {
            self.server.address = addr;
        }

        if let Ok(addr) = std::env::var("REFBOX_COMM_PEER_ADDRESS") {
            self.peer.address = addr;
        }

        if let Some(port) = env_parse::<u16>("REFBOX_COMM_PEER_SEND_PORT") {
            self.peer.send_port = port;
        }

        if let Some(port) = env_parse::<u16>("REFBOX_COMM_PEER_RECV_PORT") {
            self.peer.recv_port = port;
        }

        if let Ok(key) = std::env::var("REFBOX_COMM_CRYPTO_KEY") {
            self.peer.crypto_key = if key.is_empty() { None } else { Some(key) };
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.server.validate());
        errors.extend(self.peer.validate());
        errors.extend(self.relay.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

/// Stream client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host name or address of the stream server
    pub host: String,

    /// Port of the stream server
    pub port: u16,

    /// Timeout for one connection attempt
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whether to keep reconnecting after a disconnect or failed attempt
    pub auto_reconnect: bool,

    /// Fixed delay between reconnect attempts
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// How long short-lived tools wait for the outbound queue to drain
    #[serde(with = "duration_serde")]
    pub flush_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            auto_reconnect: true,
            reconnect_delay: timeout::RECONNECT_INTERVAL,
            flush_timeout: timeout::FLUSH_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Client config for `host:port` with default timings
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Reconnect delay too short (minimum: 10ms)".to_string());
        } else if self.reconnect_delay.as_secs() > 60 {
            errors.push("Reconnect delay too long (maximum: 60s)".to_string());
        }

        if self.flush_timeout.as_millis() < 10 {
            errors.push("Flush timeout too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Stream server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:4444")
    pub address: String,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:4444')",
                self.address
            ));
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Broadcast peer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Destination address, usually a broadcast address
    pub address: String,

    /// Port datagrams are sent to
    pub send_port: u16,

    /// Port the peer listens on; also the source port of its datagrams
    pub recv_port: u16,

    /// Symmetric key; `None` keeps the peer in plaintext
    pub crypto_key: Option<String>,

    /// Cipher used when a key is set
    pub cipher: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1"),
            send_port: DEFAULT_PORT,
            recv_port: DEFAULT_PORT,
            crypto_key: None,
            cipher: DEFAULT_CIPHER.to_string(),
        }
    }
}

impl PeerConfig {
    /// Peer sending and listening on the same port
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self::with_ports(address, port, port)
    }

    /// Peer with independent send and receive ports
    pub fn with_ports(address: impl Into<String>, send_port: u16, recv_port: u16) -> Self {
        Self {
            address: address.into(),
            send_port,
            recv_port,
            ..Self::default()
        }
    }

    /// Start with the given key installed
    pub fn encrypted(mut self, key: impl Into<String>, cipher: impl Into<String>) -> Self {
        self.crypto_key = Some(key.into());
        self.cipher = cipher.into();
        self
    }

    /// Validate peer configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Peer address cannot be empty".to_string());
        }

        if self.send_port == 0 {
            errors.push("Peer send port must be greater than 0".to_string());
        }

        if self.crypto_key.is_some()
            && crate::utils::crypto::Cipher::from_name(&self.cipher).is_none()
        {
            errors.push(format!("Unsupported cipher: '{}'", self.cipher));
        }

        errors
    }
}

/// Relay (rebroadcaster) configuration.
///
/// Index `i` of every list describes the same remote participant.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RelayConfig {
    /// Address of each participant
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Port the relay sends to for each participant (plain group)
    #[serde(default)]
    pub send_ports: Vec<u16>,

    /// Port the relay listens on for each participant (plain group)
    #[serde(default)]
    pub recv_ports: Vec<u16>,

    #[serde(default)]
    pub use_crypto1: bool,

    #[serde(default)]
    pub send_ports_crypto1: Vec<u16>,

    #[serde(default)]
    pub recv_ports_crypto1: Vec<u16>,

    #[serde(default)]
    pub use_crypto2: bool,

    #[serde(default)]
    pub send_ports_crypto2: Vec<u16>,

    #[serde(default)]
    pub recv_ports_crypto2: Vec<u16>,

    /// Probability in `[0, 1]` that an incoming datagram is not forwarded
    #[serde(default)]
    pub packet_loss: f64,
}

impl RelayConfig {
    /// Validate relay configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let n = self.addresses.len();

        if self.send_ports.len() != n || self.recv_ports.len() != n {
            errors.push(format!(
                "Relay needs one send and one recv port per address ({} addresses, {} send, {} recv)",
                n,
                self.send_ports.len(),
                self.recv_ports.len()
            ));
        }

        if self.use_crypto1
            && (self.send_ports_crypto1.len() != n || self.recv_ports_crypto1.len() != n)
        {
            errors.push("Relay crypto1 port lists must match the address list".to_string());
        }

        if self.use_crypto2
            && (self.send_ports_crypto2.len() != n || self.recv_ports_crypto2.len() != n)
        {
            errors.push("Relay crypto2 port lists must match the address list".to_string());
        }

        let mut bound = std::collections::HashSet::new();
        let enabled_recv = self
            .recv_ports
            .iter()
            .chain(self.recv_ports_crypto1.iter().filter(|_| self.use_crypto1))
            .chain(self.recv_ports_crypto2.iter().filter(|_| self.use_crypto2));
        for port in enabled_recv {
            if !bound.insert(*port) {
                errors.push(format!("Relay recv port {port} is used more than once"));
            }
        }

        if !(0.0..=1.0).contains(&self.packet_loss) {
            errors.push(format!(
                "Packet loss must be within [0, 1], got {}",
                self.packet_loss
            ));
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum payload accepted on stream sessions
    pub max_payload_size: usize,

    /// Maximum datagram size a peer will send or receive
    pub max_datagram_size: usize,

    /// Payload format shared by every participant
    pub serialization_format: SerializationFormat,

    /// Reject payloads with bytes left after the record
    pub strict_parsing: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            serialization_format: SerializationFormat::default(),
            strict_parsing: false,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.max_payload_size == 0 {
            errors.push("Max payload size cannot be 0".to_string());
        } else if self.max_payload_size > u32::MAX as usize {
            errors.push(format!(
                "Max payload size {} exceeds the 32-bit size field",
                self.max_payload_size
            ));
        }

        if self.max_datagram_size < crate::core::frame::HEADER_SIZE {
            errors.push("Max datagram size smaller than a frame header".to_string());
        } else if self.max_datagram_size > MAX_DATAGRAM_SIZE {
            errors.push(format!(
                "Max datagram size too large: {} (maximum: {MAX_DATAGRAM_SIZE})",
                self.max_datagram_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("refbox-comm"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
