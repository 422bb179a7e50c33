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

//! Protobuf wire messages, hand-tagged.
//!
//! Field tags are frozen: two Asinka instances at the same protocol version
//! interoperate at the byte level regardless of implementation language.
//! New fields get fresh tags; existing tags are never renumbered.

use std::collections::BTreeMap;

/// Tagged value on the wire. Integers at or below 32 bits are carried as
/// int64; receivers narrow from local schema context.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireValue {
    /// Exactly one kind is set; an unset oneof reads as null.
    #[prost(oneof = "wire_value::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: ::core::option::Option<wire_value::Kind>,
}

/// Nested oneof for [`WireValue`].
pub mod wire_value {
    /// Null marker, mirroring `google.protobuf.NullValue`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum NullValue {
        /// The only member.
        NullValue = 0,
    }

    /// Value kinds.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        /// UTF-8 string.
        #[prost(string, tag = "1")]
        Str(::prost::alloc::string::String),
        /// Signed integer (int32 and int64 kinds both travel here).
        #[prost(int64, tag = "2")]
        I64(i64),
        /// 64-bit float.
        #[prost(double, tag = "3")]
        F64(f64),
        /// Boolean.
        #[prost(bool, tag = "4")]
        Bool(bool),
        /// Opaque bytes.
        #[prost(bytes, tag = "5")]
        Bytes(::prost::alloc::vec::Vec<u8>),
        /// Explicit null.
        #[prost(enumeration = "NullValue", tag = "6")]
        Null(i32),
    }
}

/// Field kind declared by a schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WireFieldKind {
    /// UTF-8 string.
    String = 0,
    /// 32-bit signed integer.
    Int32 = 1,
    /// 64-bit signed integer.
    Int64 = 2,
    /// 64-bit float.
    Float64 = 3,
    /// Boolean.
    Bool = 4,
    /// Opaque bytes.
    Bytes = 5,
}

/// One schema field descriptor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldDef {
    /// Field name.
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    /// Declared kind.
    #[prost(enumeration = "WireFieldKind", tag = "2")]
    pub kind: i32,
    /// Nullability flag.
    #[prost(bool, tag = "3")]
    pub nullable: bool,
}

/// An exposed object schema.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SchemaDef {
    /// Stable type identifier.
    #[prost(string, tag = "1")]
    pub type_name: ::prost::alloc::string::String,
    /// Free-form version tag.
    #[prost(string, tag = "2")]
    pub schema_version: ::prost::alloc::string::String,
    /// Ordered field descriptors.
    #[prost(message, repeated, tag = "3")]
    pub fields: ::prost::alloc::vec::Vec<FieldDef>,
    /// Permission tokens.
    #[prost(string, repeated, tag = "4")]
    pub permissions: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
}

/// Handshake request (client side of the dial).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeRequest {
    /// Application identifier.
    #[prost(string, tag = "1")]
    pub app_id: ::prost::alloc::string::String,
    /// Human-readable application name.
    #[prost(string, tag = "2")]
    pub app_name: ::prost::alloc::string::String,
    /// Application version string.
    #[prost(string, tag = "3")]
    pub app_version: ::prost::alloc::string::String,
    /// Stable device identifier.
    #[prost(string, tag = "4")]
    pub device_id: ::prost::alloc::string::String,
    /// Identity public key bytes.
    #[prost(bytes = "vec", tag = "5")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
    /// Protocol versions the dialer speaks.
    #[prost(string, repeated, tag = "6")]
    pub supported_protocols: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// Schemas the dialer exposes.
    #[prost(message, repeated, tag = "7")]
    pub schemas: ::prost::alloc::vec::Vec<SchemaDef>,
    /// Capability map.
    #[prost(btree_map = "string, string", tag = "8")]
    pub capabilities: BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    /// X25519 ephemeral public key for session-key agreement.
    #[prost(bytes = "vec", tag = "9")]
    pub session_key_ephemeral: ::prost::alloc::vec::Vec<u8>,
}

/// Handshake response (accepting side).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HandshakeResponse {
    /// Whether the handshake was accepted.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Session id minted by the accepting side.
    #[prost(string, tag = "2")]
    pub session_id: ::prost::alloc::string::String,
    /// Identity public key bytes of the accepting side.
    #[prost(bytes = "vec", tag = "3")]
    pub public_key: ::prost::alloc::vec::Vec<u8>,
    /// Schemas the accepting side exposes.
    #[prost(message, repeated, tag = "4")]
    pub schemas: ::prost::alloc::vec::Vec<SchemaDef>,
    /// Capability map.
    #[prost(btree_map = "string, string", tag = "5")]
    pub capabilities: BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
    /// Refusal reason when `success` is false.
    #[prost(string, tag = "6")]
    pub error_message: ::prost::alloc::string::String,
    /// X25519 ephemeral public key for session-key agreement.
    #[prost(bytes = "vec", tag = "7")]
    pub session_key_ephemeral: ::prost::alloc::vec::Vec<u8>,
}

/// Replication of one object value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectUpdate {
    /// Object id.
    #[prost(string, tag = "1")]
    pub object_id: ::prost::alloc::string::String,
    /// Schema type name.
    #[prost(string, tag = "2")]
    pub type_name: ::prost::alloc::string::String,
    /// Object version; the receiver applies strictly-greater only.
    #[prost(uint32, tag = "3")]
    pub version: u32,
    /// Sender timestamp in ms since epoch.
    #[prost(uint64, tag = "4")]
    pub timestamp_ms: u64,
    /// Field values by name.
    #[prost(btree_map = "string, message", tag = "5")]
    pub fields: BTreeMap<::prost::alloc::string::String, WireValue>,
    /// Session id the update travels on.
    #[prost(string, tag = "6")]
    pub session_id: ::prost::alloc::string::String,
}

/// Replication of one object removal. Idempotent at the receiver.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectDelete {
    /// Object id.
    #[prost(string, tag = "1")]
    pub object_id: ::prost::alloc::string::String,
    /// Schema type name.
    #[prost(string, tag = "2")]
    pub type_name: ::prost::alloc::string::String,
    /// Sender timestamp in ms since epoch.
    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,
    /// Session id the delete travels on.
    #[prost(string, tag = "4")]
    pub session_id: ::prost::alloc::string::String,
}

/// Sync-stream message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SyncMessage {
    /// Update or delete.
    #[prost(oneof = "sync_message::Kind", tags = "1, 2")]
    pub kind: ::core::option::Option<sync_message::Kind>,
}

/// Nested oneof for [`SyncMessage`].
pub mod sync_message {
    /// Sync message kinds.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        /// Object value replication.
        #[prost(message, tag = "1")]
        Update(super::ObjectUpdate),
        /// Object removal replication.
        #[prost(message, tag = "2")]
        Delete(super::ObjectDelete),
    }
}

/// Fire-and-forget typed event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventMessage {
    /// Generated unique id.
    #[prost(string, tag = "1")]
    pub event_id: ::prost::alloc::string::String,
    /// Event type name.
    #[prost(string, tag = "2")]
    pub event_type: ::prost::alloc::string::String,
    /// Sender timestamp in ms since epoch.
    #[prost(uint64, tag = "3")]
    pub timestamp_ms: u64,
    /// Payload by name.
    #[prost(btree_map = "string, message", tag = "4")]
    pub data: BTreeMap<::prost::alloc::string::String, WireValue>,
    /// Session id the event travels on.
    #[prost(string, tag = "5")]
    pub session_id: ::prost::alloc::string::String,
    /// Priority (0 = low .. 3 = urgent).
    #[prost(int32, tag = "6")]
    pub priority: i32,
}

/// Unary acknowledgement for an event send.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventResponse {
    /// Whether the event was accepted for dispatch.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Echo of the event id.
    #[prost(string, tag = "2")]
    pub event_id: ::prost::alloc::string::String,
}

/// Liveness probe.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatRequest {
    /// Session id of the probing side.
    #[prost(string, tag = "1")]
    pub session_id: ::prost::alloc::string::String,
    /// Sender timestamp in ms since epoch.
    #[prost(uint64, tag = "2")]
    pub timestamp_ms: u64,
}

/// Liveness answer. The serving side always succeeds with its clock.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatResponse {
    /// Always true from a live peer.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Server timestamp in ms since epoch.
    #[prost(uint64, tag = "2")]
    pub server_timestamp_ms: u64,
}

/// An AEAD-sealed inner envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Sealed {
    /// 96-bit nonce.
    #[prost(bytes = "vec", tag = "1")]
    pub nonce: ::prost::alloc::vec::Vec<u8>,
    /// Ciphertext with appended tag.
    #[prost(bytes = "vec", tag = "2")]
    pub ciphertext: ::prost::alloc::vec::Vec<u8>,
}

/// Top-level frame body. Four logical endpoints (handshake, sync stream,
/// event, heartbeat) are multiplexed over one connection by body kind;
/// unary calls match responses through `corr`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Envelope {
    /// Correlation id for unary request/response matching. 0 on stream
    /// messages.
    #[prost(uint64, tag = "1")]
    pub corr: u64,
    /// The message.
    #[prost(oneof = "envelope::Body", tags = "2, 3, 4, 5, 6, 7, 8, 9")]
    pub body: ::core::option::Option<envelope::Body>,
}

/// Nested oneof for [`Envelope`].
pub mod envelope {
    /// Frame bodies.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        /// Handshake request (plaintext, pre-session).
        #[prost(message, tag = "2")]
        HandshakeRequest(super::HandshakeRequest),
        /// Handshake response (plaintext, pre-session).
        #[prost(message, tag = "3")]
        HandshakeResponse(super::HandshakeResponse),
        /// Sync-stream message.
        #[prost(message, tag = "4")]
        Sync(super::SyncMessage),
        /// Event unary request.
        #[prost(message, tag = "5")]
        Event(super::EventMessage),
        /// Event unary response.
        #[prost(message, tag = "6")]
        EventAck(super::EventResponse),
        /// Heartbeat unary request.
        #[prost(message, tag = "7")]
        Heartbeat(super::HeartbeatRequest),
        /// Heartbeat unary response.
        #[prost(message, tag = "8")]
        HeartbeatAck(super::HeartbeatResponse),
        /// Sealed inner envelope (everything after handshake).
        #[prost(message, tag = "9")]
        Sealed(super::Sealed),
    }
}
