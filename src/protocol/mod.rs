//! # Protocol Layer
//!
//! Message schemas and the registry that maps wire type keys to them.
//!
//! ## Components
//! - **Message**: object-safe trait implemented for every serde record
//! - **Registry**: `(component_id, message_type)` to schema lookup,
//!   frame serialization and parsing

pub mod message;
pub mod registry;
