//! # Frame Format
//!
//! One frame is a fixed 8-byte header followed by exactly `payload_size`
//! bytes of serialized message payload.
//!
//! ```text
//! [ComponentId(2)] [MessageType(2)] [PayloadSize(4)] [Payload(N)]
//! ```
//!
//! All header fields are big-endian. There is no magic, version or checksum:
//! stream transports rely on TCP for integrity and broadcast peers report
//! malformed datagrams instead of trusting them.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Size of the fixed frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Largest payload the 32-bit size field can describe
pub const MAX_FRAME_PAYLOAD: usize = u32::MAX as usize;

/// `(component_id, message_type)` pair identifying a schema on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub component_id: u16,
    pub message_type: u16,
}

impl TypeKey {
    pub const fn new(component_id: u16, message_type: u16) -> Self {
        Self {
            component_id,
            message_type,
        }
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.component_id, self.message_type)
    }
}

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub component_id: u16,
    pub message_type: u16,
    pub payload_size: u32,
}

impl FrameHeader {
    pub fn type_key(&self) -> TypeKey {
        TypeKey::new(self.component_id, self.message_type)
    }

    /// Header bytes in network order
    #[inline]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..2].copy_from_slice(&self.component_id.to_be_bytes());
        out[2..4].copy_from_slice(&self.message_type.to_be_bytes());
        out[4..8].copy_from_slice(&self.payload_size.to_be_bytes());
        out
    }

    /// Parse the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// Does not look at the payload.
    #[inline]
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(ProtocolError::InvalidHeader);
        }
        Ok(Self {
            component_id: u16::from_be_bytes([buf[0], buf[1]]),
            message_type: u16::from_be_bytes([buf[2], buf[3]]),
            payload_size: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }
}

/// A header plus the payload it describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, deriving `payload_size` from the payload
    pub fn new(component_id: u16, message_type: u16, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let payload_size =
            u32::try_from(payload.len()).map_err(|_| ProtocolError::OversizedPacket(payload.len()))?;
        Ok(Self {
            header: FrameHeader {
                component_id,
                message_type,
                payload_size,
            },
            payload,
        })
    }

    /// Re-wrap a received header and payload, e.g. for raw forwarding.
    ///
    /// Fails when the header does not describe the payload exactly.
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Result<Self> {
        if header.payload_size as usize != payload.len() {
            return Err(ProtocolError::TruncatedFrame {
                declared: header.payload_size as usize,
                available: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    /// Total encoded length
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize header + payload into one buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    pub fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Parse a whole frame from one datagram.
    ///
    /// The datagram must contain exactly one header and the payload it declares.
    pub fn from_datagram(datagram: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(datagram)?;
        let available = datagram.len() - HEADER_SIZE;
        if header.payload_size as usize != available {
            return Err(ProtocolError::TruncatedFrame {
                declared: header.payload_size as usize,
                available,
            });
        }
        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&datagram[HEADER_SIZE..]),
        })
    }
}

/// Encode a `(component_id, message_type, payload)` triple into a frame.
///
/// Only fails when the payload does not fit the 32-bit size field.
pub fn encode(component_id: u16, message_type: u16, payload: impl Into<Bytes>) -> Result<Frame> {
    Frame::new(component_id, message_type, payload)
}

/// Decode a header from network order.
pub fn decode(header_bytes: &[u8]) -> Result<FrameHeader> {
    FrameHeader::from_bytes(header_bytes)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_header_layout_is_big_endian() {
        let header = FrameHeader {
            component_id: 0x07D0,
            message_type: 0x0001,
            payload_size: 0x0000_0102,
        };
        assert_eq!(
            header.to_bytes(),
            [0x07, 0xD0, 0x00, 0x01, 0x00, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn test_decode_ignores_missing_payload() {
        // header claims 100 bytes, none follow; decode only reads the header
        let bytes = [0, 10, 0, 1, 0, 0, 0, 100];
        let header = decode(&bytes).unwrap();
        assert_eq!(header.type_key(), TypeKey::new(10, 1));
        assert_eq!(header.payload_size, 100);
    }

    #[test]
    fn test_decode_short_header() {
        assert!(matches!(
            decode(&[0, 1, 2]),
            Err(ProtocolError::InvalidHeader)
        ));
    }

    #[test]
    fn test_encode_sets_payload_size() {
        let frame = encode(10, 2, vec![1u8, 2, 3]).unwrap();
        assert_eq!(frame.header.payload_size, 3);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(&bytes[HEADER_SIZE..], &[1, 2, 3]);
    }

    #[test]
    fn test_datagram_size_mismatch() {
        let mut bytes = encode(1, 1, vec![9u8; 4]).unwrap().to_bytes().to_vec();
        bytes.pop();
        match Frame::from_datagram(&bytes) {
            Err(ProtocolError::TruncatedFrame {
                declared: 4,
                available: 3,
            }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_datagram_empty_payload() {
        let bytes = encode(3, 4, Vec::new()).unwrap().to_bytes();
        let frame = Frame::from_datagram(&bytes).unwrap();
        assert_eq!(frame.header.payload_size, 0);
        assert!(frame.payload.is_empty());
    }
}
