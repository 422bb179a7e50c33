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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Asinka - peer-to-peer object synchronization and event streaming for
//! cooperating processes on one local network.
//!
//! Each peer exposes a set of object schemas, advertises itself, discovers
//! peers, performs a mutual handshake, and then maintains long-lived
//! encrypted streams over which object changes and fire-and-forget events
//! flow in near real time. Conflict resolution is last-writer-wins by
//! version number; objects live only in the memory of running peers.
//!
//! ```no_run
//! use asinka::client::Asinka;
//! use asinka::core::config::AsinkaConfig;
//! use asinka::core::types::{SyncObject, Value};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = Asinka::create(AsinkaConfig::new("com.example.notes"))?;
//! client.start().await?;
//!
//! client.registry().register(
//!     SyncObject::new("note-1", "Note").with_field("title", Value::Str("hello".into())),
//! );
//!
//! let mut changes = client.registry().observe_all();
//! while let Some(change) = changes.recv().await {
//!     println!("{change:?}");
//! }
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

/// Client facade owning every subsystem.
pub mod client;
/// Core subsystems: types, config, registry, events, security.
pub mod core;
/// Observability (Prometheus diagnostic counters).
pub mod monitoring;
/// Networking: discovery, transport, handshake, sessions.
pub mod networking;
/// Protobuf-compatible wire format.
pub mod wire;

pub use crate::client::Asinka;
pub use crate::core::config::AsinkaConfig;
pub use crate::core::types::{Event, EventPriority, ObjectSchema, SyncObject, Value};
