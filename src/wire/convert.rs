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

//! Conversion between domain values and wire messages.
//!
//! Decoding is tolerant: unknown field names pass through untouched,
//! unknown schema kinds degrade to bytes, and int64 narrows to int32 only
//! when local schema context declares the field 32-bit and the value fits.

use crate::core::types::{
    Event, EventPriority, FieldDescriptor, FieldKind, ObjectSchema, SyncObject, Value,
};
use crate::wire::proto::{
    self, wire_value, EventMessage, FieldDef, ObjectDelete, ObjectUpdate, SchemaDef, WireFieldKind,
    WireValue,
};
use prost::Message;
use std::collections::BTreeMap;
use thiserror::Error;

/// Wire codec errors.
#[derive(Debug, Error)]
pub enum WireError {
    /// Malformed protobuf payload.
    #[error("decode")]
    Decode,
    /// Payload exceeds the configured message size.
    #[error("message too large")]
    TooLarge,
}

/// Encode an envelope to bytes.
pub fn encode_envelope(env: &proto::Envelope) -> Vec<u8> {
    env.encode_to_vec()
}

/// Decode an envelope with a hard size cap applied before parsing.
pub fn decode_envelope(bytes: &[u8], max: usize) -> Result<proto::Envelope, WireError> {
    if bytes.len() > max {
        return Err(WireError::TooLarge);
    }
    proto::Envelope::decode(bytes).map_err(|_| WireError::Decode)
}

/// Domain value to wire value.
pub fn value_to_wire(v: &Value) -> WireValue {
    let kind = match v {
        Value::Str(s) => wire_value::Kind::Str(s.clone()),
        Value::I32(n) => wire_value::Kind::I64(i64::from(*n)),
        Value::I64(n) => wire_value::Kind::I64(*n),
        Value::F64(x) => wire_value::Kind::F64(*x),
        Value::Bool(b) => wire_value::Kind::Bool(*b),
        Value::Bytes(b) => wire_value::Kind::Bytes(b.clone()),
        Value::Null => wire_value::Kind::Null(wire_value::NullValue::NullValue as i32),
    };
    WireValue { kind: Some(kind) }
}

/// Wire value to domain value, narrowing integers from `declared` context.
/// An unset oneof reads as null.
pub fn value_from_wire(v: &WireValue, declared: Option<FieldKind>) -> Value {
    match &v.kind {
        None | Some(wire_value::Kind::Null(_)) => Value::Null,
        Some(wire_value::Kind::Str(s)) => Value::Str(s.clone()),
        Some(wire_value::Kind::I64(n)) => match declared {
            Some(FieldKind::Int32) => match i32::try_from(*n) {
                Ok(narrow) => Value::I32(narrow),
                Err(_) => Value::I64(*n),
            },
            _ => Value::I64(*n),
        },
        Some(wire_value::Kind::F64(x)) => Value::F64(*x),
        Some(wire_value::Kind::Bool(b)) => Value::Bool(*b),
        Some(wire_value::Kind::Bytes(b)) => Value::Bytes(b.clone()),
    }
}

fn kind_to_wire(kind: FieldKind) -> WireFieldKind {
    match kind {
        FieldKind::String => WireFieldKind::String,
        FieldKind::Int32 => WireFieldKind::Int32,
        FieldKind::Int64 => WireFieldKind::Int64,
        FieldKind::Float64 => WireFieldKind::Float64,
        FieldKind::Bool => WireFieldKind::Bool,
        FieldKind::Bytes => WireFieldKind::Bytes,
    }
}

fn kind_from_wire(raw: i32) -> FieldKind {
    match WireFieldKind::try_from(raw) {
        Ok(WireFieldKind::String) => FieldKind::String,
        Ok(WireFieldKind::Int32) => FieldKind::Int32,
        Ok(WireFieldKind::Int64) => FieldKind::Int64,
        Ok(WireFieldKind::Float64) => FieldKind::Float64,
        Ok(WireFieldKind::Bool) => FieldKind::Bool,
        // Unknown kinds degrade to opaque bytes.
        Ok(WireFieldKind::Bytes) | Err(_) => FieldKind::Bytes,
    }
}

/// Domain schema to wire schema.
pub fn schema_to_wire(s: &ObjectSchema) -> SchemaDef {
    SchemaDef {
        type_name: s.type_name.clone(),
        schema_version: s.schema_version.clone(),
        fields: s
            .fields
            .iter()
            .map(|f| FieldDef {
                name: f.name.clone(),
                kind: kind_to_wire(f.kind) as i32,
                nullable: f.nullable,
            })
            .collect(),
        permissions: s.permissions.iter().cloned().collect(),
    }
}

/// Wire schema to domain schema.
pub fn schema_from_wire(s: &SchemaDef) -> ObjectSchema {
    ObjectSchema {
        type_name: s.type_name.clone(),
        schema_version: s.schema_version.clone(),
        fields: s
            .fields
            .iter()
            .map(|f| FieldDescriptor {
                name: f.name.clone(),
                kind: kind_from_wire(f.kind),
                nullable: f.nullable,
            })
            .collect(),
        permissions: s.permissions.iter().cloned().collect(),
    }
}

fn fields_to_wire(fields: &BTreeMap<String, Value>) -> BTreeMap<String, WireValue> {
    fields
        .iter()
        .map(|(name, v)| (name.clone(), value_to_wire(v)))
        .collect()
}

fn fields_from_wire(
    fields: &BTreeMap<String, WireValue>,
    schema: Option<&ObjectSchema>,
) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(name, v)| {
            let declared = schema.and_then(|s| s.field_kind(name));
            (name.clone(), value_from_wire(v, declared))
        })
        .collect()
}

/// Stamp a local object into an outbound update on `session_id`.
pub fn object_to_update(obj: &SyncObject, session_id: &str, timestamp_ms: u64) -> ObjectUpdate {
    ObjectUpdate {
        object_id: obj.object_id.clone(),
        type_name: obj.type_name.clone(),
        version: obj.version,
        timestamp_ms,
        fields: fields_to_wire(&obj.fields),
        session_id: session_id.to_string(),
    }
}

/// Decode an inbound update into an object, narrowing from `schema` when
/// the type is declared locally. The receiving session stamps itself as
/// the origin.
pub fn object_from_update(
    update: &ObjectUpdate,
    schema: Option<&ObjectSchema>,
    origin_session: &str,
) -> SyncObject {
    SyncObject {
        object_id: update.object_id.clone(),
        type_name: update.type_name.clone(),
        version: update.version,
        fields: fields_from_wire(&update.fields, schema),
        origin_session: Some(origin_session.to_string()),
    }
}

/// Build an outbound delete on `session_id`.
pub fn delete_message(
    object_id: &str,
    type_name: &str,
    session_id: &str,
    timestamp_ms: u64,
) -> ObjectDelete {
    ObjectDelete {
        object_id: object_id.to_string(),
        type_name: type_name.to_string(),
        timestamp_ms,
        session_id: session_id.to_string(),
    }
}

/// Stamp a local event into an outbound message on `session_id`.
pub fn event_to_wire(event: &Event, session_id: &str) -> EventMessage {
    EventMessage {
        event_id: event.event_id.clone(),
        event_type: event.event_type.clone(),
        timestamp_ms: event.timestamp_ms,
        data: fields_to_wire(&event.data),
        session_id: session_id.to_string(),
        priority: event.priority.as_i32(),
    }
}

/// Decode an inbound event message.
pub fn event_from_wire(msg: &EventMessage) -> Event {
    Event {
        event_id: msg.event_id.clone(),
        event_type: msg.event_type.clone(),
        timestamp_ms: msg.timestamp_ms,
        data: fields_from_wire(&msg.data, None),
        priority: EventPriority::from_i32(msg.priority),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_schema() -> ObjectSchema {
        ObjectSchema {
            type_name: "Task".into(),
            schema_version: "1".into(),
            fields: vec![
                FieldDescriptor {
                    name: "title".into(),
                    kind: FieldKind::String,
                    nullable: false,
                },
                FieldDescriptor {
                    name: "count".into(),
                    kind: FieldKind::Int32,
                    nullable: true,
                },
            ],
            permissions: Default::default(),
        }
    }

    #[test]
    fn update_roundtrip_preserves_unknown_fields() {
        let obj = SyncObject::new("t1", "Task")
            .with_field("title", Value::Str("buy milk".into()))
            .with_field("count", Value::I32(3))
            .with_field("not_in_schema", Value::Bytes(vec![1, 2, 3]));
        let update = object_to_update(&obj, "s-1", 1000);
        let schema = task_schema();
        let back = object_from_update(&update, Some(&schema), "s-1");

        assert_eq!(back.object_id, "t1");
        assert_eq!(back.version, 1);
        assert_eq!(back.fields.get("title"), Some(&Value::Str("buy milk".into())));
        // Narrowed back to i32 via schema context.
        assert_eq!(back.fields.get("count"), Some(&Value::I32(3)));
        // Unknown entry survives untouched.
        assert_eq!(
            back.fields.get("not_in_schema"),
            Some(&Value::Bytes(vec![1, 2, 3]))
        );
        assert_eq!(back.origin_session.as_deref(), Some("s-1"));
    }

    #[test]
    fn i64_stays_wide_without_schema_context() {
        let wire = value_to_wire(&Value::I32(7));
        assert_eq!(value_from_wire(&wire, None), Value::I64(7));
        assert_eq!(value_from_wire(&wire, Some(FieldKind::Int32)), Value::I32(7));
    }

    #[test]
    fn oversized_i64_is_not_narrowed() {
        let wire = value_to_wire(&Value::I64(i64::from(i32::MAX) + 1));
        assert_eq!(
            value_from_wire(&wire, Some(FieldKind::Int32)),
            Value::I64(i64::from(i32::MAX) + 1)
        );
    }

    #[test]
    fn null_and_unset_both_decode_to_null() {
        let explicit = value_to_wire(&Value::Null);
        assert_eq!(value_from_wire(&explicit, None), Value::Null);
        let unset = WireValue { kind: None };
        assert_eq!(value_from_wire(&unset, None), Value::Null);
    }

    #[test]
    fn envelope_decode_respects_cap() {
        let env = proto::Envelope {
            corr: 0,
            body: Some(proto::envelope::Body::Heartbeat(proto::HeartbeatRequest {
                session_id: "s".into(),
                timestamp_ms: 1,
            })),
        };
        let bytes = encode_envelope(&env);
        assert!(decode_envelope(&bytes, bytes.len()).is_ok());
        assert!(matches!(
            decode_envelope(&bytes, bytes.len() - 1),
            Err(WireError::TooLarge)
        ));
    }
}
