// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core domain types: tagged values, schemas, syncable objects, events,
//! session descriptors, and canonical encoding helpers.

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Canonical serialization error.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization")]
    Serialize,
    #[error("deserialization")]
    Deserialize,
    #[error("size limit exceeded")]
    TooLarge,
}

/// Canonical bincode options (deterministic).
fn bincode_opts() -> impl Options {
    // Fixint encoding provides a stable integer representation.
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encode with deterministic rules. Requires deterministic container ordering (use BTreeMap/BTreeSet).
pub fn encode_canonical<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    bincode_opts()
        .serialize(v)
        .map_err(|_| CodecError::Serialize)
}

/// Decode with a hard size cap.
pub fn decode_canonical_limited<T: DeserializeOwned>(
    bytes: &[u8],
    max: usize,
) -> Result<T, CodecError> {
    // Fast-path cap on the raw wire payload.
    if bytes.len() > max {
        return Err(CodecError::TooLarge);
    }
    // Defensive cap inside the deserializer to prevent memory/CPU bombs via large container lengths.
    bincode_opts()
        .with_limit(max as u64)
        .deserialize(bytes)
        .map_err(|_| CodecError::Deserialize)
}

/// Milliseconds since UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A typed field value.
///
/// Integer kinds at or below 32 bits travel as int64 on the wire; the
/// decoder narrows back to [`Value::I32`] only when local schema context
/// declares the field 32-bit and the value fits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 64-bit float.
    F64(f64),
    /// Boolean.
    Bool(bool),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Explicit null.
    Null,
}

impl Value {
    /// The field kind this value inhabits, if any (`Null` has none).
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Str(_) => Some(FieldKind::String),
            Value::I32(_) => Some(FieldKind::Int32),
            Value::I64(_) => Some(FieldKind::Int64),
            Value::F64(_) => Some(FieldKind::Float64),
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::Bytes(_) => Some(FieldKind::Bytes),
            Value::Null => None,
        }
    }
}

/// Closed set of field kinds a schema may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// UTF-8 string.
    String,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Boolean.
    Bool,
    /// Opaque bytes.
    Bytes,
}

/// One field of an object schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name, unique within the schema.
    pub name: String,
    /// Declared value kind.
    pub kind: FieldKind,
    /// Whether the field may carry an explicit null.
    pub nullable: bool,
}

/// Immutable description of a syncable object type.
///
/// Two peers interoperate on a type when both declare a schema for the
/// same `type_name`; field compatibility is not enforced by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    /// Stable type identifier.
    pub type_name: String,
    /// Free-form version tag, opaque to the engine.
    pub schema_version: String,
    /// Ordered field descriptors.
    pub fields: Vec<FieldDescriptor>,
    /// Permission tokens. Carried and exchanged, never enforced here.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl ObjectSchema {
    /// Declared kind of `field`, if the schema names it.
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == field).map(|f| f.kind)
    }
}

/// Mutable instance of a declared object type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncObject {
    /// Globally unique, application-chosen id; primary key in the registry.
    pub object_id: String,
    /// Schema type name; may be unknown locally.
    pub type_name: String,
    /// Monotonic version. Starts at 1, bumps on every local mutation.
    pub version: u32,
    /// Field values by name. Unknown names are preserved round-trip.
    pub fields: BTreeMap<String, Value>,
    /// Session id on which the current value was last observed.
    /// `None` for locally authored values.
    #[serde(default)]
    pub origin_session: Option<String>,
}

impl SyncObject {
    /// A fresh locally-authored object at version 1.
    pub fn new(object_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            type_name: type_name.into(),
            version: 1,
            fields: BTreeMap::new(),
            origin_session: None,
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Dispatch priority of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventPriority {
    /// Background interest.
    Low,
    /// Default.
    Normal,
    /// Elevated.
    High,
    /// Deliver ahead of everything else.
    Urgent,
}

impl EventPriority {
    /// Wire integer (0..=3).
    pub fn as_i32(self) -> i32 {
        match self {
            EventPriority::Low => 0,
            EventPriority::Normal => 1,
            EventPriority::High => 2,
            EventPriority::Urgent => 3,
        }
    }

    /// Decode a wire integer; out-of-range values fall back to `Normal`.
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => EventPriority::Low,
            2 => EventPriority::High,
            3 => EventPriority::Urgent,
            _ => EventPriority::Normal,
        }
    }
}

impl Default for EventPriority {
    fn default() -> Self {
        EventPriority::Normal
    }
}

/// Immutable in-transit typed message. Not persisted; dropped after dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Generated unique id.
    pub event_id: String,
    /// Application-defined type name used for receiver filtering.
    pub event_type: String,
    /// Milliseconds since UNIX epoch at creation.
    pub timestamp_ms: u64,
    /// Payload by name.
    pub data: BTreeMap<String, Value>,
    /// Dispatch priority.
    pub priority: EventPriority,
}

impl Event {
    /// A fresh event of `event_type` stamped with a new id and the current time.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            timestamp_ms: now_ms(),
            data: BTreeMap::new(),
            priority: EventPriority::Normal,
        }
    }

    /// Builder-style data insertion.
    pub fn with_data(mut self, name: impl Into<String>, value: Value) -> Self {
        self.data.insert(name.into(), value);
        self
    }

    /// Builder-style priority.
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Lifecycle phase of a peer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Opening the transport connection.
    Connecting,
    /// Outbound handshake in flight.
    HandshakingOut,
    /// Inbound handshake being answered.
    HandshakingIn,
    /// Streams open, pumps and heartbeat running.
    Active,
    /// Tearing down.
    Closing,
    /// Terminal error state.
    Failed,
}

/// Snapshot of one peer session.
#[derive(Clone, Debug)]
pub struct SessionInfo {
    /// Session id minted by the accepting side at handshake.
    pub session_id: String,
    /// Remote identity public key bytes.
    pub remote_public_key: Vec<u8>,
    /// Schemas the remote advertises.
    pub remote_schemas: Vec<ObjectSchema>,
    /// Remote capability map.
    pub remote_capabilities: BTreeMap<String, String>,
    /// Remote host.
    pub remote_host: String,
    /// Remote port.
    pub remote_port: u16,
    /// Current phase.
    pub phase: SessionPhase,
    /// Milliseconds since epoch when the session became active.
    pub established_at_ms: u64,
    /// Milliseconds since epoch of the last successful heartbeat.
    pub last_heartbeat_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_roundtrip_rejects_trailing_bytes() {
        let obj = SyncObject::new("t1", "Task").with_field("title", Value::Str("x".into()));
        let mut bytes = encode_canonical(&obj).unwrap();
        let back: SyncObject = decode_canonical_limited(&bytes, 1 << 16).unwrap();
        assert_eq!(back, obj);

        bytes.push(0);
        assert!(decode_canonical_limited::<SyncObject>(&bytes, 1 << 16).is_err());
    }

    #[test]
    fn decode_respects_size_cap() {
        let obj = SyncObject::new("big", "Blob").with_field("b", Value::Bytes(vec![7u8; 4096]));
        let bytes = encode_canonical(&obj).unwrap();
        assert!(matches!(
            decode_canonical_limited::<SyncObject>(&bytes, 128),
            Err(CodecError::TooLarge)
        ));
    }

    #[test]
    fn priority_wire_integers() {
        for p in [
            EventPriority::Low,
            EventPriority::Normal,
            EventPriority::High,
            EventPriority::Urgent,
        ] {
            assert_eq!(EventPriority::from_i32(p.as_i32()), p);
        }
        assert_eq!(EventPriority::from_i32(42), EventPriority::Normal);
    }
}
