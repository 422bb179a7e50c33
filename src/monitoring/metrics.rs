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

//! Diagnostic counters. The embedding application decides whether and how
//! to export the registry; the library serves no HTTP.

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Active sessions gauge.
    pub sessions: IntGauge,

    /// Registry changes dropped on lagging observers.
    pub registry_lagged_total: IntCounter,
    /// Events dropped on lagging subscribers.
    pub events_lagged_total: IntCounter,
    /// Remote updates dropped by the version gate.
    pub version_stale_total: IntCounter,

    /// Sync messages sent.
    pub sync_out_total: IntCounter,
    /// Sync messages applied from peers.
    pub sync_in_total: IntCounter,
    /// Events relayed to peers.
    pub events_out_total: IntCounter,
    /// Events delivered from peers.
    pub events_in_total: IntCounter,

    /// Frames that failed to decode or failed AEAD opening.
    pub invalid_msg_total: IntCounter,
    /// Heartbeat probes that missed their deadline.
    pub heartbeat_missed_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions =
            IntGauge::new("asinka_sessions", "Active sessions").map_err(|_| MetricsError::Prom)?;

        let registry_lagged_total = IntCounter::new(
            "asinka_registry_lagged_total",
            "Registry changes dropped on lagging observers",
        )
        .map_err(|_| MetricsError::Prom)?;
        let events_lagged_total = IntCounter::new(
            "asinka_events_lagged_total",
            "Events dropped on lagging subscribers",
        )
        .map_err(|_| MetricsError::Prom)?;
        let version_stale_total = IntCounter::new(
            "asinka_version_stale_total",
            "Remote updates dropped by the version gate",
        )
        .map_err(|_| MetricsError::Prom)?;

        let sync_out_total = IntCounter::new("asinka_sync_out_total", "Sync messages sent")
            .map_err(|_| MetricsError::Prom)?;
        let sync_in_total =
            IntCounter::new("asinka_sync_in_total", "Sync messages applied from peers")
                .map_err(|_| MetricsError::Prom)?;
        let events_out_total = IntCounter::new("asinka_events_out_total", "Events relayed to peers")
            .map_err(|_| MetricsError::Prom)?;
        let events_in_total =
            IntCounter::new("asinka_events_in_total", "Events delivered from peers")
                .map_err(|_| MetricsError::Prom)?;

        let invalid_msg_total = IntCounter::new(
            "asinka_invalid_msg_total",
            "Frames that failed to decode or open",
        )
        .map_err(|_| MetricsError::Prom)?;
        let heartbeat_missed_total = IntCounter::new(
            "asinka_heartbeat_missed_total",
            "Heartbeat probes that missed their deadline",
        )
        .map_err(|_| MetricsError::Prom)?;

        for c in [
            &registry_lagged_total,
            &events_lagged_total,
            &version_stale_total,
            &sync_out_total,
            &sync_in_total,
            &events_out_total,
            &events_in_total,
            &invalid_msg_total,
            &heartbeat_missed_total,
        ] {
            registry
                .register(Box::new(c.clone()))
                .map_err(|_| MetricsError::Prom)?;
        }
        registry
            .register(Box::new(sessions.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            sessions,
            registry_lagged_total,
            events_lagged_total,
            version_stale_total,
            sync_out_total,
            sync_in_total,
            events_out_total,
            events_in_total,
            invalid_msg_total,
            heartbeat_missed_total,
        })
    }
}
