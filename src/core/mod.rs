//! # Core Frame Components
//!
//! Low-level frame handling, stream codec, and payload serialization.
//!
//! ## Components
//! - **Frame**: fixed 8-byte header plus payload, datagram parsing
//! - **Codec**: Tokio codec for framing over byte streams
//! - **Serialization**: payload formats used by the message registry
//!
//! ## Wire Format
//! ```text
//! [ComponentId(2)] [MessageType(2)] [PayloadSize(4)] [Payload(N)]
//! ```
//!
//! ## Limits
//! - The size field is 32 bits; larger payloads are refused at encode time
//! - Stream decoders refuse declared sizes above the configured maximum
//!   before allocating

pub mod codec;
pub mod frame;
pub mod serialization;
