//! # Payload Serialization Formats
//!
//! Frame payloads are opaque to the transport; the message registry turns
//! them into typed records with one of the formats below. Every participant
//! sharing a port must agree on the format, there is no in-band marker.
//!
//! ## Formats
//! - **Bincode**: binary compact format (default, fastest)
//! - **JSON**: human-readable, useful when sniffing traffic
//! - **MessagePack**: compact binary, self-describing
//!
//! ## Parse Modes
//! Parsing is permissive by default: once a complete record has been read,
//! any bytes left in the payload are ignored. Strict mode rejects leftovers.

use std::io::Cursor;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Supported payload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Binary compact format (default, fastest)
    #[default]
    Bincode,
    /// Human-readable JSON format (debugging, interop)
    Json,
    /// Compact binary format (MessagePack, efficient)
    #[serde(rename = "msgpack")]
    MessagePack,
}

impl SerializationFormat {
    /// Get human-readable name
    pub fn name(self) -> &'static str {
        match self {
            SerializationFormat::Bincode => "Bincode",
            SerializationFormat::Json => "JSON",
            SerializationFormat::MessagePack => "MessagePack",
        }
    }
}

/// Serialize a record into payload bytes
pub fn to_payload<T: Serialize + ?Sized>(value: &T, format: SerializationFormat) -> Result<Vec<u8>> {
    match format {
        SerializationFormat::Bincode => bincode::serialize(value)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string())),
        SerializationFormat::Json => serde_json::to_vec(value)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string())),
        SerializationFormat::MessagePack => rmp_serde::to_vec(value)
            .map_err(|e| ProtocolError::SerializationFailed(e.to_string())),
    }
}

/// Parse payload bytes into a record.
///
/// With `strict` unset, bytes after the first complete record are ignored.
pub fn from_payload<T: DeserializeOwned>(
    data: &[u8],
    format: SerializationFormat,
    strict: bool,
) -> Result<T> {
    match format {
        SerializationFormat::Bincode => {
            // bincode::deserialize is fixint + trailing bytes allowed
            let opts = bincode::options().with_fixint_encoding();
            let parsed = if strict {
                opts.reject_trailing_bytes().deserialize(data)
            } else {
                opts.allow_trailing_bytes().deserialize(data)
            };
            parsed.map_err(|e| ProtocolError::DeserializeError(e.to_string()))
        }
        SerializationFormat::Json => {
            if strict {
                return serde_json::from_slice(data)
                    .map_err(|e| ProtocolError::DeserializeError(e.to_string()));
            }
            serde_json::Deserializer::from_slice(data)
                .into_iter::<T>()
                .next()
                .unwrap_or_else(|| {
                    Err(serde::de::Error::custom("empty JSON payload"))
                })
                .map_err(|e| ProtocolError::DeserializeError(e.to_string()))
        }
        SerializationFormat::MessagePack => {
            let mut cursor = Cursor::new(data);
            let value: T = rmp_serde::decode::from_read(&mut cursor)
                .map_err(|e| ProtocolError::DeserializeError(e.to_string()))?;
            let consumed = cursor.position() as usize;
            if strict && consumed != data.len() {
                return Err(ProtocolError::DeserializeError(format!(
                    "{} trailing bytes after record",
                    data.len() - consumed
                )));
            }
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Beacon {
        seq: u64,
        team_name: String,
        peer_name: String,
    }

    fn beacon() -> Beacon {
        Beacon {
            seq: 42,
            team_name: "Carologistics".into(),
            peer_name: "R-1".into(),
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(SerializationFormat::Bincode.name(), "Bincode");
        assert_eq!(SerializationFormat::Json.name(), "JSON");
        assert_eq!(SerializationFormat::MessagePack.name(), "MessagePack");
    }

    #[test]
    fn test_default_format() {
        assert_eq!(SerializationFormat::default(), SerializationFormat::Bincode);
    }

    #[test]
    fn test_all_formats_recover_record() {
        for format in [
            SerializationFormat::Bincode,
            SerializationFormat::Json,
            SerializationFormat::MessagePack,
        ] {
            let bytes = to_payload(&beacon(), format).unwrap();
            let back: Beacon = from_payload(&bytes, format, true).unwrap();
            assert_eq!(back, beacon(), "format {}", format.name());
        }
    }

    #[test]
    fn test_trailing_bytes_permissive_vs_strict() {
        for format in [
            SerializationFormat::Bincode,
            SerializationFormat::Json,
            SerializationFormat::MessagePack,
        ] {
            let mut bytes = to_payload(&beacon(), format).unwrap();
            bytes.extend_from_slice(b" \x00\x01junk");

            let lenient: Beacon = from_payload(&bytes, format, false).unwrap();
            assert_eq!(lenient, beacon());

            let strict: Result<Beacon> = from_payload(&bytes, format, true);
            assert!(
                matches!(strict, Err(ProtocolError::DeserializeError(_))),
                "format {} accepted trailing bytes",
                format.name()
            );
        }
    }

    #[test]
    fn test_truncated_payload_fails() {
        let bytes = to_payload(&beacon(), SerializationFormat::Bincode).unwrap();
        let res: Result<Beacon> =
            from_payload(&bytes[..bytes.len() - 2], SerializationFormat::Bincode, false);
        assert!(matches!(res, Err(ProtocolError::DeserializeError(_))));
    }

    #[test]
    fn test_format_config_names() {
        #[derive(Deserialize)]
        struct Holder {
            format: SerializationFormat,
        }
        let h: Holder = toml::from_str("format = \"msgpack\"").unwrap();
        assert_eq!(h.format, SerializationFormat::MessagePack);
        let h: Holder = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(h.format, SerializationFormat::Json);
    }
}
