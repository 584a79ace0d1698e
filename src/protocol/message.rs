//! # Message Schemas
//!
//! Any serde record with a `Default` value can travel in a frame. The
//! [`Message`] trait is implemented for all of them, so schemas never need a
//! manual impl; it gives the registry an object-safe handle to encode, parse
//! and spawn empty instances without knowing the concrete type.
//!
//! A schema that knows its own wire identity implements [`WireIdentity`],
//! usually through the [`wire_identity!`](crate::wire_identity) macro, and can
//! then be registered without passing ids explicitly.
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use refbox_comm::wire_identity;
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! pub struct BeaconSignal {
//!     pub seq: u64,
//!     pub team_name: String,
//! }
//! wire_identity!(BeaconSignal, 2000, 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::frame::TypeKey;
use crate::core::serialization::{self, SerializationFormat};
use crate::error::{constants, ProtocolError, Result};

/// Shared handle to a decoded message, as delivered in transport events
pub type MessagePtr = Arc<dyn Message>;

/// Object-safe view of a message schema
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Fully qualified Rust type name of the schema
    fn type_name(&self) -> &'static str;

    /// Encode this record as frame payload
    fn encode_payload(&self, format: SerializationFormat) -> Result<Vec<u8>>;

    /// Replace this record's contents with the parsed payload
    fn merge_payload(
        &mut self,
        payload: &[u8],
        format: SerializationFormat,
        strict: bool,
    ) -> Result<()>;

    /// Fresh, empty instance of the same schema
    fn new_empty(&self) -> Box<dyn Message>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> Message for T
where
    T: Serialize + DeserializeOwned + Default + fmt::Debug + Send + Sync + 'static,
{
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn encode_payload(&self, format: SerializationFormat) -> Result<Vec<u8>> {
        serialization::to_payload(self, format)
    }

    fn merge_payload(
        &mut self,
        payload: &[u8],
        format: SerializationFormat,
        strict: bool,
    ) -> Result<()> {
        *self = serialization::from_payload(payload, format, strict)?;
        Ok(())
    }

    fn new_empty(&self) -> Box<dyn Message> {
        Box::new(T::default())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn Message {
    /// Whether this message is a `T`
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Recover the concrete schema from a shared message handle
    pub fn downcast_arc<T: Message>(self: Arc<Self>) -> Option<Arc<T>> {
        self.into_any_arc().downcast::<T>().ok()
    }

    /// Recover the concrete schema from a boxed message
    pub fn downcast_box<T: Message>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

/// Wire identity declared by the schema itself.
///
/// Both constants default to `None`, which self-describing registration
/// reports as missing type information. Values are checked against the
/// 16-bit range at registration time.
pub trait WireIdentity {
    const COMP_ID: Option<i64> = None;
    const MSG_TYPE: Option<i64> = None;
}

/// Resolve and validate the declared identity of `M`
pub fn declared_type_key<M: Message + WireIdentity>() -> Result<TypeKey> {
    let type_name = std::any::type_name::<M>();
    let comp_id = M::COMP_ID.ok_or(ProtocolError::MissingTypeInfo {
        type_name,
        reason: constants::ERR_MISSING_COMP_ID,
    })?;
    let msg_type = M::MSG_TYPE.ok_or(ProtocolError::MissingTypeInfo {
        type_name,
        reason: constants::ERR_MISSING_MSG_TYPE,
    })?;

    let component_id = u16::try_from(comp_id).map_err(|_| ProtocolError::InvalidTypeId {
        type_name,
        field: "COMP_ID",
        value: comp_id,
    })?;
    let message_type = u16::try_from(msg_type).map_err(|_| ProtocolError::InvalidTypeId {
        type_name,
        field: "MSG_TYPE",
        value: msg_type,
    })?;

    Ok(TypeKey::new(component_id, message_type))
}

/// Implement [`WireIdentity`] for a schema.
///
/// `wire_identity!(GameState, 2000, 20);`
#[macro_export]
macro_rules! wire_identity {
    ($ty:ty, $comp_id:expr, $msg_type:expr) => {
        impl $crate::protocol::message::WireIdentity for $ty {
            const COMP_ID: Option<i64> = Some($comp_id as i64);
            const MSG_TYPE: Option<i64> = Some($msg_type as i64);
        }
    };
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct GameState {
        points_cyan: u32,
        points_magenta: u32,
    }
    wire_identity!(GameState, 2000, 20);

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct NoIdentity;
    impl WireIdentity for NoIdentity {}

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct OnlyComp;
    impl WireIdentity for OnlyComp {
        const COMP_ID: Option<i64> = Some(1);
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct WideType;
    wire_identity!(WideType, 1, 70_000);

    #[test]
    fn test_declared_key() {
        assert_eq!(
            declared_type_key::<GameState>().unwrap(),
            TypeKey::new(2000, 20)
        );
    }

    #[test]
    fn test_missing_declarations() {
        assert!(matches!(
            declared_type_key::<NoIdentity>(),
            Err(ProtocolError::MissingTypeInfo { reason, .. }) if reason == constants::ERR_MISSING_COMP_ID
        ));
        assert!(matches!(
            declared_type_key::<OnlyComp>(),
            Err(ProtocolError::MissingTypeInfo { reason, .. }) if reason == constants::ERR_MISSING_MSG_TYPE
        ));
    }

    #[test]
    fn test_out_of_range_declaration() {
        assert!(matches!(
            declared_type_key::<WideType>(),
            Err(ProtocolError::InvalidTypeId {
                field: "MSG_TYPE",
                value: 70_000,
                ..
            })
        ));
    }

    #[test]
    fn test_downcast_shared_message() {
        let msg: MessagePtr = Arc::new(GameState {
            points_cyan: 12,
            points_magenta: 3,
        });
        assert!(msg.is::<GameState>());
        assert!(msg.downcast_ref::<NoIdentity>().is_none());
        let state = msg.downcast_arc::<GameState>().expect("GameState");
        assert_eq!(state.points_cyan, 12);
    }

    #[test]
    fn test_new_empty_is_default() {
        let msg = GameState {
            points_cyan: 5,
            points_magenta: 5,
        };
        let empty = msg.new_empty().downcast_box::<GameState>().unwrap();
        assert_eq!(*empty, GameState::default());
    }
}
