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

//! Client configuration.
//!
//! Plain data with serde defaults so embedders can build it in code or load
//! it from TOML. Validation happens once, at [`crate::client::Asinka::create`].

use crate::core::types::ObjectSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors surfaced at client construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `app_id` must be non-empty.
    #[error("app_id is required")]
    MissingAppId,
    /// `service_name` must be non-empty.
    #[error("service_name must not be empty")]
    EmptyServiceName,
    /// A tuning value is out of its accepted range.
    #[error("invalid tuning: {0}")]
    InvalidTuning(&'static str),
    /// TOML parse failure when loading from a string.
    #[error("parse config")]
    Parse,
}

fn default_service_name() -> String {
    "default-sync".to_string()
}

fn default_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_server_port() -> u16 {
    8888
}

/// Transport tuning knobs with the documented defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTuning {
    /// Maximum encoded frame size in bytes.
    pub max_message_size: usize,
    /// Heartbeat period.
    pub keepalive_period: Duration,
    /// Deadline for each heartbeat response.
    pub keepalive_timeout: Duration,
    /// Connection closed after this long without an inbound frame.
    pub idle_timeout: Duration,
    /// Graceful-shutdown drain budget.
    pub shutdown_drain: Duration,
    /// Deadline for the unary handshake exchange.
    pub handshake_deadline: Duration,
    /// Consecutive missed heartbeats before teardown.
    pub max_missed_heartbeats: u32,
}

impl Default for TransportTuning {
    fn default() -> Self {
        Self {
            max_message_size: 4 * 1024 * 1024,
            keepalive_period: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            shutdown_drain: Duration::from_secs(5),
            handshake_deadline: Duration::from_secs(5),
            max_missed_heartbeats: 3,
        }
    }
}

/// Top-level client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AsinkaConfig {
    /// Application identifier. Required; also published as a discovery attr
    /// so peers of the same application can suppress self-dials.
    pub app_id: String,
    /// Human-readable application name.
    #[serde(default)]
    pub app_name: String,
    /// Application version string.
    #[serde(default)]
    pub app_version: String,
    /// Stable device identifier. Defaults to a fresh UUID.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Human part of the advertised service name.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// TCP listen port. 0 binds an ephemeral port.
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Object schemas this peer exposes.
    #[serde(default)]
    pub schemas: Vec<ObjectSchema>,
    /// Free-form capability map exchanged at handshake.
    #[serde(default)]
    pub capabilities: BTreeMap<String, String>,
    /// Transport tuning.
    #[serde(default)]
    pub tuning: TransportTuning,
}

impl AsinkaConfig {
    /// Minimal configuration for `app_id`, everything else defaulted.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_name: String::new(),
            app_version: String::new(),
            device_id: default_device_id(),
            service_name: default_service_name(),
            server_port: default_server_port(),
            schemas: Vec::new(),
            capabilities: BTreeMap::new(),
            tuning: TransportTuning::default(),
        }
    }

    /// Parse a TOML document into a config.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let cfg: AsinkaConfig = toml::from_str(raw).map_err(|_| ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate invariants that construction cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::MissingAppId);
        }
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }
        if self.tuning.max_message_size == 0 {
            return Err(ConfigError::InvalidTuning("max_message_size must be > 0"));
        }
        if self.tuning.keepalive_period.is_zero() || self.tuning.keepalive_timeout.is_zero() {
            return Err(ConfigError::InvalidTuning("keepalive must be > 0"));
        }
        if self.tuning.max_missed_heartbeats == 0 {
            return Err(ConfigError::InvalidTuning("max_missed_heartbeats must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AsinkaConfig::new("com.example.app");
        assert_eq!(cfg.service_name, "default-sync");
        assert_eq!(cfg.server_port, 8888);
        assert_eq!(cfg.tuning.max_message_size, 4 * 1024 * 1024);
        assert_eq!(cfg.tuning.keepalive_period, Duration::from_secs(30));
        assert_eq!(cfg.tuning.max_missed_heartbeats, 3);
        assert!(cfg.validate().is_ok());
        assert!(!cfg.device_id.is_empty());
    }

    #[test]
    fn empty_app_id_is_rejected() {
        let cfg = AsinkaConfig::new("  ");
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingAppId)));
    }

    #[test]
    fn toml_loading_applies_defaults() {
        let cfg = AsinkaConfig::from_toml(r#"app_id = "com.example.notes""#).unwrap();
        assert_eq!(cfg.app_id, "com.example.notes");
        assert_eq!(cfg.server_port, 8888);
    }
}
