// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0

//! Shared helpers for the integration tests.

use asinka::client::Asinka;
use asinka::core::config::AsinkaConfig;
use asinka::networking::discovery::{
    AdvertiseHandle, DiscoveryError, DiscoveryHandle, DiscoveryProvider,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A discovery provider that never finds anything. End-to-end tests dial
/// explicitly; real multicast on the test host must not inject extra
/// sessions into the assertions.
pub struct NullDiscovery;

#[async_trait]
impl DiscoveryProvider for NullDiscovery {
    async fn advertise(
        &self,
        _service_name: &str,
        _port: u16,
    ) -> Result<AdvertiseHandle, DiscoveryError> {
        let (_tx, rx) = mpsc::channel(1);
        let (stop, _) = watch::channel(false);
        Ok(AdvertiseHandle::new(rx, stop))
    }

    async fn discover(&self) -> Result<DiscoveryHandle, DiscoveryError> {
        let (_tx, rx) = mpsc::channel(1);
        let (stop, _) = watch::channel(false);
        Ok(DiscoveryHandle::new(rx, stop))
    }
}

/// A peer with explicit-dial-only discovery and an ephemeral port.
pub fn create_peer(config: AsinkaConfig) -> Asinka {
    let name = format!("asinka-test-{}", &config.device_id[..8]);
    Asinka::with_provider(config, name, Arc::new(NullDiscovery)).unwrap()
}
