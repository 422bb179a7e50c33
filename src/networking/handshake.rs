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

//! Handshake engine: protocol negotiation, identity and capability
//! exchange, session-id minting.
//!
//! One request/response round trip. Authentication is trust-on-first-use
//! in v1; no signature over the exchange. Session-key material (an X25519
//! ephemeral public key each way) rides along, and both ends derive the
//! session key bound to the minted session id.

use crate::core::config::AsinkaConfig;
use crate::core::security::SecurityEnvelope;
use crate::core::types::ObjectSchema;
use crate::wire::convert::{schema_from_wire, schema_to_wire};
use crate::wire::proto::{HandshakeRequest, HandshakeResponse};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Protocol versions this implementation speaks, newest first.
pub const PROTOCOL_VERSIONS: &[&str] = &["asinka-v1"];

/// Handshake refusals. Surfaced from `connect`; the session is never
/// created.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer refused or the response failed validation.
    #[error("handshake refused: {0}")]
    Refused(String),
}

/// Accepted handshake, server side: what the session is built from.
#[derive(Debug)]
pub struct AcceptedHandshake {
    /// Freshly minted session id.
    pub session_id: String,
    /// Dialer's identity public key.
    pub remote_public_key: Vec<u8>,
    /// Dialer's exposed schemas.
    pub remote_schemas: Vec<ObjectSchema>,
    /// Dialer's capability map.
    pub remote_capabilities: BTreeMap<String, String>,
    /// Dialer's X25519 ephemeral public key.
    pub remote_ephemeral: Vec<u8>,
}

/// Validated handshake, client side.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The response is well-formed and positive.
    Success {
        /// Session id minted by the accepting side.
        session_id: String,
        /// Accepting side's identity public key.
        remote_public_key: Vec<u8>,
        /// Accepting side's exposed schemas.
        remote_schemas: Vec<ObjectSchema>,
        /// Accepting side's capability map.
        remote_capabilities: BTreeMap<String, String>,
        /// Accepting side's X25519 ephemeral public key.
        remote_ephemeral: Vec<u8>,
    },
    /// Refused or malformed.
    Failure {
        /// Why.
        message: String,
    },
}

/// Build the outbound request from our configuration and identity.
pub fn build_request(
    config: &AsinkaConfig,
    envelope: &SecurityEnvelope,
    ephemeral_public: &[u8],
) -> HandshakeRequest {
    HandshakeRequest {
        app_id: config.app_id.clone(),
        app_name: config.app_name.clone(),
        app_version: config.app_version.clone(),
        device_id: config.device_id.clone(),
        public_key: envelope.public_key(),
        supported_protocols: PROTOCOL_VERSIONS.iter().map(|p| p.to_string()).collect(),
        schemas: config.schemas.iter().map(schema_to_wire).collect(),
        capabilities: config.capabilities.clone(),
        session_key_ephemeral: ephemeral_public.to_vec(),
    }
}

/// Server side: answer a request. A protocol mismatch or missing key
/// material yields a refusal response and no session.
pub fn process_request(
    request: &HandshakeRequest,
    config: &AsinkaConfig,
    envelope: &SecurityEnvelope,
    ephemeral_public: &[u8],
) -> (HandshakeResponse, Option<AcceptedHandshake>) {
    let common = request
        .supported_protocols
        .iter()
        .any(|p| PROTOCOL_VERSIONS.contains(&p.as_str()));
    if !common {
        let message = format!(
            "no common protocol: peer speaks {:?}, we speak {:?}",
            request.supported_protocols, PROTOCOL_VERSIONS
        );
        warn!(peer_app = %request.app_id, %message, "refusing handshake");
        return (refusal(&message), None);
    }
    if request.public_key.is_empty() {
        return (refusal("missing identity public key"), None);
    }
    if request.session_key_ephemeral.is_empty() {
        return (refusal("missing session key material"), None);
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let response = HandshakeResponse {
        success: true,
        session_id: session_id.clone(),
        public_key: envelope.public_key(),
        schemas: config.schemas.iter().map(schema_to_wire).collect(),
        capabilities: config.capabilities.clone(),
        error_message: String::new(),
        session_key_ephemeral: ephemeral_public.to_vec(),
    };
    let accepted = AcceptedHandshake {
        session_id,
        remote_public_key: request.public_key.clone(),
        remote_schemas: request.schemas.iter().map(schema_from_wire).collect(),
        remote_capabilities: request.capabilities.clone(),
        remote_ephemeral: request.session_key_ephemeral.clone(),
    };
    (response, Some(accepted))
}

/// Client side: validate a response.
pub fn validate_response(response: &HandshakeResponse) -> HandshakeOutcome {
    if !response.success {
        let message = if response.error_message.is_empty() {
            "peer refused the handshake".to_string()
        } else {
            response.error_message.clone()
        };
        return HandshakeOutcome::Failure { message };
    }
    if response.session_id.is_empty() {
        return HandshakeOutcome::Failure {
            message: "response carries no session id".to_string(),
        };
    }
    if response.public_key.is_empty() {
        return HandshakeOutcome::Failure {
            message: "response carries no identity public key".to_string(),
        };
    }
    if response.session_key_ephemeral.is_empty() {
        return HandshakeOutcome::Failure {
            message: "response carries no session key material".to_string(),
        };
    }
    HandshakeOutcome::Success {
        session_id: response.session_id.clone(),
        remote_public_key: response.public_key.clone(),
        remote_schemas: response.schemas.iter().map(schema_from_wire).collect(),
        remote_capabilities: response.capabilities.clone(),
        remote_ephemeral: response.session_key_ephemeral.clone(),
    }
}

fn refusal(message: &str) -> HandshakeResponse {
    HandshakeResponse {
        success: false,
        session_id: String::new(),
        public_key: Vec::new(),
        schemas: Vec::new(),
        capabilities: BTreeMap::new(),
        error_message: message.to_string(),
        session_key_ephemeral: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixtures() -> (AsinkaConfig, SecurityEnvelope) {
        (
            AsinkaConfig::new("com.example.app"),
            SecurityEnvelope::new().unwrap(),
        )
    }

    #[test]
    fn happy_path_mints_a_session() {
        let (config, envelope) = fixtures();
        let client_eph = envelope.begin_agreement().unwrap();
        let server_eph = envelope.begin_agreement().unwrap();
        let request = build_request(&config, &envelope, client_eph.public_key());
        assert_eq!(request.supported_protocols, vec!["asinka-v1".to_string()]);

        let (response, accepted) =
            process_request(&request, &config, &envelope, server_eph.public_key());
        let accepted = accepted.expect("accepted");
        assert!(response.success);
        assert!(!response.session_id.is_empty());
        assert_eq!(response.session_id, accepted.session_id);

        match validate_response(&response) {
            HandshakeOutcome::Success { session_id, .. } => {
                assert_eq!(session_id, accepted.session_id);
            }
            HandshakeOutcome::Failure { message } => panic!("unexpected failure: {message}"),
        }
    }

    #[test]
    fn protocol_mismatch_is_refused_with_detail() {
        let (config, envelope) = fixtures();
        let eph = envelope.begin_agreement().unwrap();
        let mut request = build_request(&config, &envelope, eph.public_key());
        request.supported_protocols = vec!["asinka-v9".to_string()];

        let (response, accepted) = process_request(&request, &config, &envelope, eph.public_key());
        assert!(accepted.is_none());
        assert!(!response.success);
        assert!(response.error_message.contains("no common protocol"));

        match validate_response(&response) {
            HandshakeOutcome::Failure { message } => {
                assert!(message.contains("no common protocol"));
            }
            HandshakeOutcome::Success { .. } => panic!("must not validate"),
        }
    }

    #[test]
    fn responses_missing_fields_fail_validation() {
        let (config, envelope) = fixtures();
        let eph = envelope.begin_agreement().unwrap();
        let request = build_request(&config, &envelope, eph.public_key());
        let (good, _) = process_request(&request, &config, &envelope, eph.public_key());

        let mut no_session = good.clone();
        no_session.session_id.clear();
        assert!(matches!(
            validate_response(&no_session),
            HandshakeOutcome::Failure { .. }
        ));

        let mut no_key = good.clone();
        no_key.public_key.clear();
        assert!(matches!(
            validate_response(&no_key),
            HandshakeOutcome::Failure { .. }
        ));

        let mut no_eph = good;
        no_eph.session_key_ephemeral.clear();
        assert!(matches!(
            validate_response(&no_eph),
            HandshakeOutcome::Failure { .. }
        ));
    }
}
