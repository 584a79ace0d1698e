//! # Error Types
//!
//! Error handling for the frame transport.
//!
//! This module defines every error variant that can occur while framing,
//! registering, serializing or moving messages between transport roles.
//!
//! ## Error Categories
//! - **Registration Errors**: duplicate keys, missing or out-of-range wire identity
//! - **Lookup Errors**: unregistered wire types or type names
//! - **Codec Errors**: serialization, parsing and frame-shape violations
//! - **Cryptographic Errors**: encryption/decryption failures, unknown ciphers
//! - **Transport Errors**: I/O failures, closed or missing sessions, timeouts
//!
//! An unregistered wire type is reported as [`ProtocolError::UnregisteredType`]
//! by the registry, but transport roles never surface it for inbound frames:
//! such frames are dropped silently.
//!
//! ## Example Usage
//! ```rust
//! use refbox_comm::error::{ProtocolError, Result};
//! use refbox_comm::protocol::registry::MessageRegistry;
//!
//! fn lookup(registry: &MessageRegistry) -> Result<()> {
//!     match registry.new_instance(10, 1) {
//!         Ok(_) => Ok(()),
//!         Err(ProtocolError::UnregisteredType { .. }) => Ok(()),
//!         Err(e) => Err(e),
//!     }
//! }
//!
//! assert!(lookup(&MessageRegistry::new()).is_ok());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Self-describing registration errors
    pub const ERR_MISSING_COMP_ID: &str = "Message declares no COMP_ID";
    pub const ERR_MISSING_MSG_TYPE: &str = "Message declares no MSG_TYPE";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed by remote";
    pub const ERR_CANCELLED: &str = "Cancelled by owner";
}

// ProtocolError is the primary error type for all transport operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Message type {component_id}:{message_type} already registered")]
    DuplicateType { component_id: u16, message_type: u16 },

    #[error("Missing wire identity on {type_name}: {reason}")]
    MissingTypeInfo {
        type_name: &'static str,
        reason: &'static str,
    },

    #[error("Invalid wire identity on {type_name}: {field}={value} is outside 0..=65535")]
    InvalidTypeId {
        type_name: &'static str,
        field: &'static str,
        value: i64,
    },

    #[error("Message type {component_id}:{message_type} not registered")]
    UnregisteredType { component_id: u16, message_type: u16 },

    #[error("Message type {0} not registered")]
    UnknownTypeName(String),

    #[error("Cannot serialize message: {0}")]
    SerializationFailed(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Invalid frame header")]
    InvalidHeader,

    #[error("Frame declares {declared} payload bytes but {available} are present")]
    TruncatedFrame { declared: usize, available: usize },

    #[error("Payload too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Encryption failed")]
    EncryptionFailure,

    #[error("Decryption failed")]
    DecryptionFailure,

    #[error("Unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Unknown session: {0}")]
    UnknownSession(u64),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error means "nobody registered this wire type".
    ///
    /// Transport roles use this to tell a silent drop apart from a
    /// decode failure that must be reported.
    pub fn is_unregistered(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnregisteredType { .. } | ProtocolError::UnknownTypeName(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_classification() {
        let err = ProtocolError::UnregisteredType {
            component_id: 1,
            message_type: 2,
        };
        assert!(err.is_unregistered());
        assert!(ProtocolError::UnknownTypeName("x".into()).is_unregistered());
        assert!(!ProtocolError::DecryptionFailure.is_unregistered());
    }

    #[test]
    fn test_display_contains_type_key() {
        let err = ProtocolError::DuplicateType {
            component_id: 2000,
            message_type: 31,
        };
        assert_eq!(err.to_string(), "Message type 2000:31 already registered");
    }
}
