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

//! Discovery port: the contracts the core consumes from a name-service
//! provider, plus the service-name convention.
//!
//! Providers are external collaborators. Advertisements and discovery
//! watches are scoped resources: dropping a handle retracts the
//! advertisement or stops the watch. A bundled LAN provider lives in
//! [`crate::networking::beacon`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// DNS-SD service type for Asinka peers.
pub const SERVICE_TYPE: &str = "_asinka._tcp.";

/// Prefix every Asinka service name carries.
pub const SERVICE_PREFIX: &str = "asinka-";

/// Mint a full service name: `asinka-<human name>-<8 random hex chars>`.
pub fn mint_service_name(human: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{SERVICE_PREFIX}{human}-{}", &suffix[..8])
}

/// Whether `name` follows the Asinka service-name convention.
pub fn is_asinka_service(name: &str) -> bool {
    name.starts_with(SERVICE_PREFIX)
}

/// Discovery provider errors, carried on the streams; the core continues
/// across them.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket setup failed.
    #[error("bind: {0}")]
    Bind(String),
    /// Datagram I/O failed.
    #[error("io: {0}")]
    Io(String),
}

/// A discovered (or advertised-by-us) service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Full service name.
    pub name: String,
    /// Service type tag, normally [`SERVICE_TYPE`].
    pub type_tag: String,
    /// Host address.
    pub host: String,
    /// TCP port the peer accepts sessions on.
    pub port: u16,
    /// Free-form attributes (app id, device id, ...).
    pub attrs: BTreeMap<String, String>,
}

/// Advertisement lifecycle notifications.
#[derive(Clone, Debug)]
pub enum AdvertiseEvent {
    /// Not currently announcing.
    Idle,
    /// Announcing on the network.
    Advertising,
    /// Provider error; the advertisement keeps trying.
    Error {
        /// Provider-specific code.
        code: i32,
        /// Human-readable description.
        message: String,
    },
}

/// Peer appearance notifications.
#[derive(Clone, Debug)]
pub enum DiscoveryEvent {
    /// A service appeared or changed.
    Found(ServiceInfo),
    /// A service went away (named by full service name).
    Lost(String),
    /// Provider error; discovery keeps running.
    Error {
        /// Provider-specific code.
        code: i32,
        /// Human-readable description.
        message: String,
    },
}

/// Scoped advertisement. Dropping the handle retracts it.
pub struct AdvertiseHandle {
    events: mpsc::Receiver<AdvertiseEvent>,
    // Dropping the sender signals the provider task to stop.
    _stop: watch::Sender<bool>,
}

impl AdvertiseHandle {
    /// Assemble from an event receiver and the stop signal the provider
    /// task watches.
    pub fn new(events: mpsc::Receiver<AdvertiseEvent>, stop: watch::Sender<bool>) -> Self {
        Self {
            events,
            _stop: stop,
        }
    }

    /// Next lifecycle event, `None` when the provider task ends.
    pub async fn recv(&mut self) -> Option<AdvertiseEvent> {
        self.events.recv().await
    }
}

/// Scoped discovery watch. Dropping the handle stops it.
pub struct DiscoveryHandle {
    events: mpsc::Receiver<DiscoveryEvent>,
    _stop: watch::Sender<bool>,
}

impl DiscoveryHandle {
    /// Assemble from an event receiver and the stop signal the provider
    /// task watches.
    pub fn new(events: mpsc::Receiver<DiscoveryEvent>, stop: watch::Sender<bool>) -> Self {
        Self {
            events,
            _stop: stop,
        }
    }

    /// Next discovery event, `None` when the provider task ends.
    pub async fn recv(&mut self) -> Option<DiscoveryEvent> {
        self.events.recv().await
    }
}

/// The port a discovery provider implements.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Start announcing `service_name` on `port`.
    async fn advertise(
        &self,
        service_name: &str,
        port: u16,
    ) -> Result<AdvertiseHandle, DiscoveryError>;

    /// Start watching for peers.
    async fn discover(&self) -> Result<DiscoveryHandle, DiscoveryError>;
}
