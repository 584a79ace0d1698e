//! # Message Registry
//!
//! Maps wire type keys to message prototypes and turns frames into typed
//! messages and back.
//!
//! A registry is filled during setup and then shared read-mostly between
//! any number of transport roles through an `Arc`. Registering while traffic
//! is flowing works (the maps sit behind an `RwLock`) but frames that arrive
//! before their type is registered are dropped.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace};

use crate::config::TransportConfig;
use crate::core::frame::{Frame, FrameHeader, TypeKey};
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{declared_type_key, Message, WireIdentity};

struct RegisteredType {
    prototype: Box<dyn Message>,
    type_name: &'static str,
}

#[derive(Default)]
struct RegistryMaps {
    by_key: HashMap<TypeKey, RegisteredType>,
    by_name: HashMap<&'static str, TypeKey>,
}

/// Type registry shared by clients, servers and peers
pub struct MessageRegistry {
    maps: RwLock<RegistryMaps>,
    format: SerializationFormat,
    strict: bool,
}

impl Default for MessageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("types", &self.len())
            .field("format", &self.format)
            .field("strict", &self.strict)
            .finish()
    }
}

impl MessageRegistry {
    /// Empty registry using bincode payloads and permissive parsing
    pub fn new() -> Self {
        Self::with_format(SerializationFormat::default())
    }

    pub fn with_format(format: SerializationFormat) -> Self {
        Self {
            maps: RwLock::new(RegistryMaps::default()),
            format,
            strict: false,
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        Self::with_format(config.serialization_format).strict_parsing(config.strict_parsing)
    }

    /// Reject payloads with bytes left over after the record
    pub fn strict_parsing(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    // poisoning is ignored; map updates never panic midway
    fn read(&self) -> RwLockReadGuard<'_, RegistryMaps> {
        self.maps.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryMaps> {
        self.maps.write().unwrap_or_else(|e| e.into_inner())
    }

    fn insert<M: Message + Default>(&self, key: TypeKey) -> Result<()> {
        let mut maps = self.write();
        if maps.by_key.contains_key(&key) {
            return Err(ProtocolError::DuplicateType {
                component_id: key.component_id,
                message_type: key.message_type,
            });
        }

        let type_name = std::any::type_name::<M>();
        maps.by_key.insert(
            key,
            RegisteredType {
                prototype: Box::new(M::default()),
                type_name,
            },
        );
        // a schema registered under several keys resolves to the latest one
        maps.by_name.insert(type_name, key);
        debug!(%key, type_name, "Registered message type");
        Ok(())
    }

    /// Bind `M` to an explicit wire key
    pub fn register<M: Message + Default>(&self, component_id: u16, message_type: u16) -> Result<()> {
        self.insert::<M>(TypeKey::new(component_id, message_type))
    }

    /// Bind `M` to the key it declares through [`WireIdentity`]
    pub fn register_self_describing<M: Message + Default + WireIdentity>(&self) -> Result<TypeKey> {
        let key = declared_type_key::<M>()?;
        self.insert::<M>(key)?;
        Ok(key)
    }

    /// Remove a binding. Does nothing if the key is unknown.
    pub fn unregister(&self, component_id: u16, message_type: u16) -> Result<()> {
        let key = TypeKey::new(component_id, message_type);
        let mut maps = self.write();
        if let Some(removed) = maps.by_key.remove(&key) {
            if maps.by_name.get(removed.type_name) == Some(&key) {
                maps.by_name.remove(removed.type_name);
            }
            debug!(%key, type_name = removed.type_name, "Unregistered message type");
        }
        Ok(())
    }

    pub fn is_registered(&self, component_id: u16, message_type: u16) -> bool {
        self.read()
            .by_key
            .contains_key(&TypeKey::new(component_id, message_type))
    }

    pub fn len(&self) -> usize {
        self.read().by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered keys, sorted
    pub fn type_keys(&self) -> Vec<TypeKey> {
        let mut keys: Vec<TypeKey> = self.read().by_key.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Empty instance of the schema bound to a key
    pub fn new_instance(&self, component_id: u16, message_type: u16) -> Result<Box<dyn Message>> {
        let key = TypeKey::new(component_id, message_type);
        let maps = self.read();
        maps.by_key
            .get(&key)
            .map(|entry| entry.prototype.new_empty())
            .ok_or(ProtocolError::UnregisteredType {
                component_id,
                message_type,
            })
    }

    /// Empty instance of the schema with the given Rust type name
    pub fn new_instance_by_name(&self, type_name: &str) -> Result<Box<dyn Message>> {
        let maps = self.read();
        maps.by_name
            .get(type_name)
            .and_then(|key| maps.by_key.get(key))
            .map(|entry| entry.prototype.new_empty())
            .ok_or_else(|| ProtocolError::UnknownTypeName(type_name.to_string()))
    }

    /// Key under which this message's schema is registered
    pub fn type_key_of(&self, message: &dyn Message) -> Result<TypeKey> {
        let maps = self.read();
        maps.by_name
            .get(message.type_name())
            .copied()
            .ok_or_else(|| ProtocolError::UnknownTypeName(message.type_name().to_string()))
    }

    /// Serialize `message` into a frame tagged with the given key
    pub fn serialize(
        &self,
        component_id: u16,
        message_type: u16,
        message: &dyn Message,
    ) -> Result<Frame> {
        let payload = message.encode_payload(self.format)?;
        Frame::new(component_id, message_type, payload)
    }

    /// Serialize `message` under the key its schema is registered with
    pub fn serialize_message(&self, message: &dyn Message) -> Result<Frame> {
        let key = self.type_key_of(message)?;
        self.serialize(key.component_id, key.message_type, message)
    }

    /// Instantiate and parse the message a frame carries.
    ///
    /// Fails with [`ProtocolError::UnregisteredType`] for unknown keys; the
    /// transports treat that as a silent drop.
    pub fn deserialize(&self, header: &FrameHeader, payload: &[u8]) -> Result<Box<dyn Message>> {
        let mut message = self.new_instance(header.component_id, header.message_type)?;
        let declared = header.payload_size as usize;
        let payload = &payload[..declared.min(payload.len())];
        message.merge_payload(payload, self.format, self.strict)?;
        trace!(key = %header.type_key(), bytes = payload.len(), "Deserialized message");
        Ok(message)
    }
}
