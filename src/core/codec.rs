//! Tokio codec for framing over byte streams.
//!
//! The decoder keeps partial frames in the `Framed` read buffer until a
//! header and its whole payload have arrived, so a frame split across any
//! number of reads is delivered once, intact.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::frame::{Frame, FrameHeader, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl FrameCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::from_bytes(&src[..HEADER_SIZE])?;
        let size = header.payload_size as usize;
        if size > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(size));
        }

        let total = HEADER_SIZE + size;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(size).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.payload.len() > self.max_payload_size {
            return Err(ProtocolError::OversizedPacket(item.payload.len()));
        }
        item.write_to(dst);
        Ok(())
    }
}
