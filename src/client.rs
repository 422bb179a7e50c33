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

//! Client facade: owns every subsystem, starts and stops them, and
//! surfaces the public operations.
//!
//! Multiple clients may coexist in one process; nothing here is global.
//! `start`/`stop` are idempotent. Background tasks exit on the shutdown
//! signal, which also fires when the client is dropped, so scoped cleanup
//! runs on every exit path.

use crate::core::config::{AsinkaConfig, ConfigError};
use crate::core::events::EventBus;
use crate::core::registry::ObjectRegistry;
use crate::core::security::{CryptoError, SecurityEnvelope};
use crate::core::types::SessionInfo;
use crate::monitoring::Metrics;
use crate::networking::beacon::LanBeacon;
use crate::networking::discovery::{
    is_asinka_service, mint_service_name, AdvertiseEvent, DiscoveryEvent, DiscoveryProvider,
};
use crate::networking::session::{ConnectError, SessionContext, SessionManager};
use crate::networking::transport::{TransportError, TransportServer};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Errors surfaced from [`Asinka::create`].
#[derive(Debug, Error)]
pub enum CreateError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The identity keypair could not be initialized.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// Metric registration failed.
    #[error("metrics init failed")]
    Metrics,
}

/// What a running client holds; emptied by `stop`.
struct RunState {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    bound_port: Option<u16>,
}

/// The Asinka client.
pub struct Asinka {
    config: AsinkaConfig,
    service_name: String,
    registry: Arc<ObjectRegistry>,
    bus: Arc<EventBus>,
    security: Arc<SecurityEnvelope>,
    metrics: Arc<Metrics>,
    manager: Arc<SessionManager>,
    provider: Arc<dyn DiscoveryProvider>,
    run: Mutex<RunState>,
}

impl Asinka {
    /// Construct all components with the bundled LAN discovery provider.
    /// Fails on invalid configuration or if the identity keypair cannot be
    /// initialized.
    pub fn create(config: AsinkaConfig) -> Result<Self, CreateError> {
        config.validate()?;
        let service_name = mint_service_name(&config.service_name);
        let mut attrs = BTreeMap::new();
        attrs.insert("app_id".to_string(), config.app_id.clone());
        attrs.insert("device_id".to_string(), config.device_id.clone());
        if !config.app_version.is_empty() {
            attrs.insert("app_version".to_string(), config.app_version.clone());
        }
        let provider = Arc::new(LanBeacon::new(service_name.clone(), attrs));
        Self::with_provider(config, service_name, provider)
    }

    /// Construct with an external discovery provider (an OS name-service
    /// daemon, a test double).
    pub fn with_provider(
        config: AsinkaConfig,
        service_name: String,
        provider: Arc<dyn DiscoveryProvider>,
    ) -> Result<Self, CreateError> {
        config.validate()?;
        let metrics = Arc::new(Metrics::new().map_err(|_| CreateError::Metrics)?);
        let security = Arc::new(SecurityEnvelope::new()?);
        let registry = Arc::new(ObjectRegistry::new(metrics.clone()));
        let bus = Arc::new(EventBus::new(metrics.clone()));
        let manager = SessionManager::new(SessionContext::new(
            config.clone(),
            registry.clone(),
            bus.clone(),
            security.clone(),
            metrics.clone(),
        ));
        Ok(Self {
            config,
            service_name,
            registry,
            bus,
            security,
            metrics,
            manager,
            provider,
            run: Mutex::new(RunState {
                shutdown: None,
                tasks: Vec::new(),
                bound_port: None,
            }),
        })
    }

    /// Start the transport server, the advertisement, discovery, and the
    /// event fan-out. Idempotent.
    pub async fn start(&self) -> Result<(), TransportError> {
        let mut run = self.run.lock().await;
        if run.shutdown.is_some() {
            debug!("start on a running client; nothing to do");
            return Ok(());
        }

        let server = TransportServer::bind(self.config.server_port).await?;
        let port = server.local_port()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        // Accept loop. Inbound handshakes run inside a JoinSet so stopping
        // the loop also cancels any half-done handshake.
        {
            let manager = self.manager.clone();
            let mut stop = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                let mut inbound = JoinSet::new();
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        Some(_) = inbound.join_next(), if !inbound.is_empty() => {}
                        accepted = server.accept() => match accepted {
                            Ok((stream, peer)) => {
                                inbound.spawn(manager.clone().handle_inbound(stream, peer));
                            }
                            Err(e) => {
                                warn!(err = %e, "accept failed");
                            }
                        }
                    }
                }
                inbound.shutdown().await;
                debug!("accept loop stopped");
            }));
        }

        // Advertisement watcher. The task owns the handle; cancelling it
        // drops the handle, which retracts the advertisement.
        match self.provider.advertise(&self.service_name, port).await {
            Ok(mut advertisement) => {
                let mut stop = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            _ = stop.changed() => break,
                            event = advertisement.recv() => match event {
                                Some(AdvertiseEvent::Error { code, message }) => {
                                    warn!(code, %message, "advertisement error");
                                }
                                Some(event) => debug!(?event, "advertisement"),
                                None => break,
                            }
                        }
                    }
                }));
            }
            Err(e) => warn!(err = %e, "could not start advertising; peers must dial explicitly"),
        }

        // Discovery watcher with the auto-connect policy.
        match self.provider.discover().await {
            Ok(mut discovered) => {
                let manager = self.manager.clone();
                let service_name = self.service_name.clone();
                let app_id = self.config.app_id.clone();
                let device_id = self.config.device_id.clone();
                let mut stop = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    loop {
                        let event = tokio::select! {
                            _ = stop.changed() => break,
                            event = discovered.recv() => event,
                        };
                        match event {
                            Some(DiscoveryEvent::Found(info)) => {
                                if !is_asinka_service(&info.name)
                                    || info.name == service_name
                                    || info.name.contains(&app_id)
                                {
                                    continue;
                                }
                                if info.attrs.get("device_id") == Some(&device_id) {
                                    continue;
                                }
                                if manager.has_session_to(&info.host, info.port).await {
                                    continue;
                                }
                                info!(service = %info.name, host = %info.host, port = info.port, "auto-connecting");
                                // One attempt per sighting; re-discovery
                                // drives any retry.
                                match manager.connect(&info.host, info.port).await {
                                    Ok(session) => {
                                        debug!(session = %session.session_id, "auto-connect established");
                                    }
                                    Err(e) => {
                                        warn!(service = %info.name, err = %e, "auto-connect failed");
                                    }
                                }
                            }
                            Some(DiscoveryEvent::Lost(name)) => {
                                debug!(service = %name, "peer lost");
                            }
                            Some(DiscoveryEvent::Error { code, message }) => {
                                warn!(code, %message, "discovery error");
                            }
                            None => break,
                        }
                    }
                }));
            }
            Err(e) => warn!(err = %e, "could not start discovery; peers must dial explicitly"),
        }

        tasks.push(self.manager.spawn_event_fanout(shutdown_rx));

        run.shutdown = Some(shutdown_tx);
        run.tasks = tasks;
        run.bound_port = Some(port);
        info!(service = %self.service_name, port, "client started");
        Ok(())
    }

    /// Stop discovery, retract the advertisement, drain the transport, and
    /// tear down all sessions. Idempotent.
    pub async fn stop(&self) {
        let (shutdown, tasks) = {
            let mut run = self.run.lock().await;
            let Some(shutdown) = run.shutdown.take() else {
                return;
            };
            run.bound_port = None;
            (shutdown, std::mem::take(&mut run.tasks))
        };

        let _ = shutdown.send(true);
        let drain = self.config.tuning.shutdown_drain;
        let aborts: Vec<_> = tasks.iter().map(|t| t.abort_handle()).collect();
        if timeout(drain, futures::future::join_all(tasks)).await.is_err() {
            warn!("background tasks exceeded the drain budget; aborting");
            for abort in aborts {
                abort.abort();
            }
        }
        self.manager.shutdown_all(drain).await;
        info!(service = %self.service_name, "client stopped");
    }

    /// Explicit dial.
    pub async fn connect(&self, host: &str, port: u16) -> Result<SessionInfo, ConnectError> {
        self.manager.connect(host, port).await
    }

    /// Remove a session, closing its streams. Returns false for unknown
    /// ids.
    pub async fn disconnect(&self, session_id: &str) -> bool {
        self.manager.disconnect(session_id).await
    }

    /// Snapshot of active sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.manager.sessions().await
    }

    /// The object registry.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// The security envelope.
    pub fn security(&self) -> &SecurityEnvelope {
        &self.security
    }

    /// Diagnostic counters.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &AsinkaConfig {
        &self.config
    }

    /// The full advertised service name.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The port the transport server is bound to, when started. With
    /// `server_port = 0` this is the ephemeral port that was assigned.
    pub async fn local_port(&self) -> Option<u16> {
        self.run.lock().await.bound_port
    }
}
