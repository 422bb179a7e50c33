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

//! Session manager: per-peer state machines and the wiring between
//! transport, registry, event bus, and the security envelope.
//!
//! Each active session runs four tasks: a writer (seals and writes
//! frames), a reader (opens frames and routes them), an outbound pump
//! (relays local registry changes, skipping those that originated on this
//! session), and a heartbeat ticker (three consecutive misses close the
//! session). The first task to exit tears the whole session down; a
//! transport failure on one session never touches the others.
//!
//! Table entries exist only for the `Active` phase. `Connecting` and the
//! handshake phases live on the stack of the connect/accept paths, and
//! `Closing`/`Failed` are the teardown paths, so `sessions()` never
//! reports a half-built or dying session.

use crate::core::config::AsinkaConfig;
use crate::core::events::EventBus;
use crate::core::registry::{ChangeStream, ObjectRegistry, RegistryChange};
use crate::core::security::{SecurityEnvelope, SessionKey};
use crate::core::types::{now_ms, Event, ObjectSchema, SessionInfo, SessionPhase};
use crate::monitoring::Metrics;
use crate::networking::handshake::{self, HandshakeError, HandshakeOutcome};
use crate::networking::transport::{
    dial, open_envelope, seal_envelope, split_framed, FrameReader, FrameWriter, TransportError,
};
use crate::wire::convert::{
    delete_message, event_from_wire, event_to_wire, object_from_update, object_to_update,
};
use crate::wire::proto::{self, envelope::Body, sync_message};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outbound queue depth per session.
const OUTBOUND_CAPACITY: usize = 256;

/// Errors surfaced from an explicit dial.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Connection or stream failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The peer refused or the response failed validation.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    /// Session-key negotiation failed.
    #[error("session key negotiation failed")]
    Crypto,
}

/// Shared dependencies every session task needs.
pub(crate) struct SessionContext {
    pub config: AsinkaConfig,
    pub registry: Arc<ObjectRegistry>,
    pub bus: Arc<EventBus>,
    pub security: Arc<SecurityEnvelope>,
    pub metrics: Arc<Metrics>,
    /// Local schemas by type name, for decode-side integer narrowing.
    pub schemas: HashMap<String, ObjectSchema>,
}

impl SessionContext {
    pub(crate) fn new(
        config: AsinkaConfig,
        registry: Arc<ObjectRegistry>,
        bus: Arc<EventBus>,
        security: Arc<SecurityEnvelope>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let schemas = config
            .schemas
            .iter()
            .map(|s| (s.type_name.clone(), s.clone()))
            .collect();
        Self {
            config,
            registry,
            bus,
            security,
            metrics,
            schemas,
        }
    }
}

/// In-flight unary calls awaiting their correlated response.
struct PendingCalls {
    next: AtomicU64,
    map: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
}

impl PendingCalls {
    fn new() -> Self {
        Self {
            // corr 0 marks stream messages; unary ids start at 1.
            next: AtomicU64::new(1),
            map: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self) -> (u64, oneshot::Receiver<Body>) {
        let corr = self.next.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut map) = self.map.lock() {
            map.insert(corr, tx);
        }
        (corr, rx)
    }

    fn complete(&self, corr: u64, body: Body) {
        let sender = match self.map.lock() {
            Ok(mut map) => map.remove(&corr),
            Err(_) => None,
        };
        match sender {
            Some(tx) => {
                let _ = tx.send(body);
            }
            None => debug!(corr, "response for unknown correlation id"),
        }
    }

    fn discard(&self, corr: u64) {
        if let Ok(mut map) = self.map.lock() {
            map.remove(&corr);
        }
    }
}

/// Table entry for one active session.
struct SessionHandle {
    info: SessionInfo,
    last_heartbeat_ms: Arc<AtomicU64>,
    outbound_tx: mpsc::Sender<proto::Envelope>,
    pending: Arc<PendingCalls>,
    shutdown: watch::Sender<bool>,
    // Held so shutdown_all can await/abort the teardown; dropping it
    // merely detaches the supervisor.
    supervisor: Option<JoinHandle<()>>,
}

/// The session manager.
pub struct SessionManager {
    ctx: Arc<SessionContext>,
    table: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub(crate) fn new(ctx: SessionContext) -> Arc<Self> {
        Arc::new(Self {
            ctx: Arc::new(ctx),
            table: RwLock::new(HashMap::new()),
        })
    }

    /// Explicit outbound dial: `Connecting` → `HandshakingOut` → `Active`.
    pub async fn connect(self: &Arc<Self>, host: &str, port: u16) -> Result<SessionInfo, ConnectError> {
        let tuning = &self.ctx.config.tuning;
        debug!(host, port, "connecting");
        let stream = dial(host, port, tuning.handshake_deadline).await?;
        let (mut reader, mut writer) = split_framed(stream, tuning.max_message_size);

        let agreement = self
            .ctx
            .security
            .begin_agreement()
            .map_err(|_| ConnectError::Crypto)?;
        let request =
            handshake::build_request(&self.ctx.config, &self.ctx.security, agreement.public_key());
        writer
            .write_envelope(&proto::Envelope {
                corr: 0,
                body: Some(Body::HandshakeRequest(request)),
            })
            .await?;

        let reply = timeout(tuning.handshake_deadline, reader.read_envelope())
            .await
            .map_err(|_| TransportError::Deadline)??;
        let Some(Body::HandshakeResponse(response)) = reply.body else {
            return Err(HandshakeError::Refused("unexpected frame during handshake".into()).into());
        };

        match handshake::validate_response(&response) {
            HandshakeOutcome::Failure { message } => {
                info!(host, port, %message, "handshake refused");
                Err(HandshakeError::Refused(message).into())
            }
            HandshakeOutcome::Success {
                session_id,
                remote_public_key,
                remote_schemas,
                remote_capabilities,
                remote_ephemeral,
            } => {
                let key = agreement
                    .derive(&remote_ephemeral, &session_id)
                    .map_err(|_| ConnectError::Crypto)?;
                // Subscribe before returning: a register() racing this
                // call must land in the pump's buffer, not a gap.
                let changes = self.ctx.registry.observe_all();
                let info = SessionInfo {
                    session_id,
                    remote_public_key,
                    remote_schemas,
                    remote_capabilities,
                    remote_host: host.to_string(),
                    remote_port: port,
                    phase: SessionPhase::Active,
                    established_at_ms: now_ms(),
                    last_heartbeat_ms: now_ms(),
                };
                Ok(self.install_session(info, key, reader, writer, changes).await)
            }
        }
    }

    /// Server role on an accepted connection: `HandshakingIn` → `Active`.
    pub(crate) async fn handle_inbound(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let tuning = &self.ctx.config.tuning;
        let (mut reader, mut writer) = split_framed(stream, tuning.max_message_size);

        let first = match timeout(tuning.handshake_deadline, reader.read_envelope()).await {
            Ok(Ok(env)) => env,
            Ok(Err(e)) => {
                debug!(%peer, err = %e, "inbound connection dropped before handshake");
                return;
            }
            Err(_) => {
                debug!(%peer, "inbound handshake deadline elapsed");
                return;
            }
        };
        let corr = first.corr;
        let Some(Body::HandshakeRequest(request)) = first.body else {
            warn!(%peer, "first frame was not a handshake request");
            return;
        };

        let Ok(agreement) = self.ctx.security.begin_agreement() else {
            warn!(%peer, "could not start key agreement");
            return;
        };
        let (response, accepted) = handshake::process_request(
            &request,
            &self.ctx.config,
            &self.ctx.security,
            agreement.public_key(),
        );
        // Subscribe before acknowledging the handshake: anything the
        // application registers once the peer sees our response is already
        // buffered for the pump.
        let changes = self.ctx.registry.observe_all();
        if let Err(e) = writer
            .write_envelope(&proto::Envelope {
                corr,
                body: Some(Body::HandshakeResponse(response)),
            })
            .await
        {
            warn!(%peer, err = %e, "failed to answer handshake");
            return;
        }
        let Some(accepted) = accepted else {
            // Refusal already sent; nothing to tear down.
            return;
        };

        let Ok(key) = agreement.derive(&accepted.remote_ephemeral, &accepted.session_id) else {
            warn!(%peer, "session key derivation failed");
            return;
        };
        let info = SessionInfo {
            session_id: accepted.session_id,
            remote_public_key: accepted.remote_public_key,
            remote_schemas: accepted.remote_schemas,
            remote_capabilities: accepted.remote_capabilities,
            remote_host: peer.ip().to_string(),
            remote_port: peer.port(),
            phase: SessionPhase::Active,
            established_at_ms: now_ms(),
            last_heartbeat_ms: now_ms(),
        };
        self.install_session(info, key, reader, writer, changes).await;
    }

    /// Wire up the four session tasks and insert the table entry.
    async fn install_session(
        self: &Arc<Self>,
        info: SessionInfo,
        key: SessionKey,
        reader: FrameReader,
        writer: FrameWriter,
        changes: ChangeStream,
    ) -> SessionInfo {
        let session_id = info.session_id.clone();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let pending = Arc::new(PendingCalls::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let last_heartbeat_ms = Arc::new(AtomicU64::new(info.last_heartbeat_ms));

        let handle = SessionHandle {
            info: info.clone(),
            last_heartbeat_ms: last_heartbeat_ms.clone(),
            outbound_tx: outbound_tx.clone(),
            pending: pending.clone(),
            shutdown: shutdown_tx,
            supervisor: None,
        };
        // The entry goes in before the tasks start, so an instantly failing
        // connection still finds something to tear down.
        self.table.write().await.insert(session_id.clone(), handle);
        self.ctx.metrics.sessions.inc();
        info!(
            session = %session_id,
            peer_key = %hex::encode(&info.remote_public_key),
            host = %info.remote_host,
            port = info.remote_port,
            "session active"
        );

        let supervisor = tokio::spawn(run_session(
            self.clone(),
            session_id.clone(),
            key,
            reader,
            writer,
            outbound_tx,
            outbound_rx,
            changes,
            pending,
            shutdown_rx,
            last_heartbeat_ms,
        ));
        if let Some(entry) = self.table.write().await.get_mut(&session_id) {
            entry.supervisor = Some(supervisor);
        }
        info
    }

    /// Snapshot of active sessions.
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.table
            .read()
            .await
            .values()
            .filter(|h| h.info.phase == SessionPhase::Active)
            .map(|h| {
                let mut info = h.info.clone();
                info.last_heartbeat_ms = h.last_heartbeat_ms.load(Ordering::Relaxed);
                info
            })
            .collect()
    }

    /// Whether any active session already points at `host:port`.
    pub(crate) async fn has_session_to(&self, host: &str, port: u16) -> bool {
        self.table
            .read()
            .await
            .values()
            .any(|h| h.info.remote_host == host && h.info.remote_port == port)
    }

    /// Remove a session, closing its streams. Idempotent.
    pub async fn disconnect(&self, session_id: &str) -> bool {
        let Some(handle) = self.table.write().await.remove(session_id) else {
            return false;
        };
        self.ctx.metrics.sessions.dec();
        let _ = handle.shutdown.send(true);
        info!(session = %session_id, "session disconnected");
        true
    }

    /// Internal teardown from the supervisor. No-op if `disconnect` or
    /// `shutdown_all` already removed the entry.
    async fn finish_session(&self, session_id: &str) {
        if self.table.write().await.remove(session_id).is_some() {
            self.ctx.metrics.sessions.dec();
            info!(session = %session_id, "session closed");
        }
    }

    /// Tear everything down, draining supervisors for up to `drain`.
    pub(crate) async fn shutdown_all(&self, drain: std::time::Duration) {
        let handles: Vec<SessionHandle> = {
            let mut table = self.table.write().await;
            let drained: Vec<SessionHandle> = table.drain().map(|(_, h)| h).collect();
            drained
        };
        if handles.is_empty() {
            return;
        }
        self.ctx.metrics.sessions.sub(handles.len() as i64);

        let mut supervisors = Vec::new();
        for mut handle in handles {
            let _ = handle.shutdown.send(true);
            if let Some(sup) = handle.supervisor.take() {
                supervisors.push(sup);
            }
        }
        let aborts: Vec<_> = supervisors.iter().map(|s| s.abort_handle()).collect();
        if timeout(drain, futures::future::join_all(supervisors))
            .await
            .is_err()
        {
            warn!("session drain budget exceeded; aborting remaining teardown");
            for abort in aborts {
                abort.abort();
            }
        }
    }

    /// Fan an event out to every active session in parallel, skipping the
    /// session it arrived on. Failures are logged, never fatal.
    pub(crate) async fn fan_out_event(&self, event: &Event, origin: Option<&str>) {
        let targets: Vec<(String, mpsc::Sender<proto::Envelope>, Arc<PendingCalls>)> = {
            self.table
                .read()
                .await
                .values()
                .filter(|h| origin != Some(h.info.session_id.as_str()))
                .map(|h| {
                    (
                        h.info.session_id.clone(),
                        h.outbound_tx.clone(),
                        h.pending.clone(),
                    )
                })
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        let ack_deadline = self.ctx.config.tuning.keepalive_timeout;
        let sends = targets.into_iter().map(|(session_id, tx, pending)| {
            let event = event.clone();
            let metrics = self.ctx.metrics.clone();
            async move {
                let (corr, rx) = pending.register();
                let msg = event_to_wire(&event, &session_id);
                let frame = proto::Envelope {
                    corr,
                    body: Some(Body::Event(msg)),
                };
                if tx.send(frame).await.is_err() {
                    pending.discard(corr);
                    debug!(session = %session_id, "session gone before event send");
                    return;
                }
                metrics.events_out_total.inc();
                match timeout(ack_deadline, rx).await {
                    Ok(Ok(Body::EventAck(ack))) if ack.success => {
                        debug!(session = %session_id, event = %ack.event_id, "event acknowledged");
                    }
                    _ => {
                        pending.discard(corr);
                        warn!(
                            session = %session_id,
                            event = %event.event_id,
                            "event delivery unacknowledged"
                        );
                    }
                }
            }
        });
        futures::future::join_all(sends).await;
    }

    /// The event fan-out pump: relays locally observed events to peers,
    /// never echoing a remote event back to its origin session.
    pub(crate) fn spawn_event_fanout(
        self: &Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        // Subscribe before the task runs so nothing sent right after
        // start() slips past the pump.
        let mut events = manager.ctx.bus.observe_tagged();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    maybe = events.recv() => {
                        let Some(tagged) = maybe else { break };
                        manager
                            .fan_out_event(&tagged.event, tagged.origin_session.as_deref())
                            .await;
                    }
                }
            }
            debug!("event fan-out pump stopped");
        })
    }
}

/// Supervise one session: spawn the four tasks, wait for the first to
/// exit, then cancel the rest and drop the table entry.
#[allow(clippy::too_many_arguments)]
async fn run_session(
    manager: Arc<SessionManager>,
    session_id: String,
    key: SessionKey,
    reader: FrameReader,
    writer: FrameWriter,
    outbound_tx: mpsc::Sender<proto::Envelope>,
    outbound_rx: mpsc::Receiver<proto::Envelope>,
    changes: ChangeStream,
    pending: Arc<PendingCalls>,
    shutdown: watch::Receiver<bool>,
    last_heartbeat_ms: Arc<AtomicU64>,
) {
    let ctx = manager.ctx.clone();
    let mut tasks = JoinSet::new();
    tasks.spawn(writer_task(
        ctx.clone(),
        key.clone(),
        writer,
        outbound_rx,
        shutdown.clone(),
    ));
    tasks.spawn(reader_task(
        ctx.clone(),
        session_id.clone(),
        key,
        reader,
        outbound_tx.clone(),
        pending.clone(),
        shutdown.clone(),
    ));
    tasks.spawn(outbound_pump(
        ctx.clone(),
        session_id.clone(),
        changes,
        outbound_tx.clone(),
        shutdown.clone(),
    ));
    tasks.spawn(heartbeat_task(
        ctx,
        session_id.clone(),
        outbound_tx,
        pending,
        shutdown,
        last_heartbeat_ms,
    ));

    // First exit wins: shutdown signal, stream error, heartbeat limit.
    let _ = tasks.join_next().await;
    debug!(session = %session_id, "session closing");
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    manager.finish_session(&session_id).await;
}

/// Seal and write queued envelopes.
async fn writer_task(
    ctx: Arc<SessionContext>,
    key: SessionKey,
    mut writer: FrameWriter,
    mut outbound_rx: mpsc::Receiver<proto::Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe = outbound_rx.recv() => {
                let Some(inner) = maybe else { break };
                let frame = match seal_envelope(&ctx.security, &key, &inner) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(err = %e, "failed to seal outbound frame");
                        continue;
                    }
                };
                if let Err(e) = writer.write_envelope(&frame).await {
                    warn!(err = %e, "write failed; closing session");
                    break;
                }
            }
        }
    }
}

/// Read, open, and route inbound frames.
async fn reader_task(
    ctx: Arc<SessionContext>,
    session_id: String,
    key: SessionKey,
    mut reader: FrameReader,
    outbound_tx: mpsc::Sender<proto::Envelope>,
    pending: Arc<PendingCalls>,
    mut shutdown: watch::Receiver<bool>,
) {
    let idle = ctx.config.tuning.idle_timeout;
    let max = ctx.config.tuning.max_message_size;
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            read = timeout(idle, reader.read_envelope()) => read,
        };
        let envelope = match frame {
            Err(_) => {
                warn!(session = %session_id, "idle timeout; closing connection");
                break;
            }
            Ok(Err(TransportError::Closed)) => {
                debug!(session = %session_id, "peer closed the stream");
                break;
            }
            Ok(Err(e)) => {
                warn!(session = %session_id, err = %e, "stream error");
                break;
            }
            Ok(Ok(envelope)) => envelope,
        };

        let inner = match envelope.body {
            Some(Body::Sealed(sealed)) => {
                match open_envelope(&ctx.security, &key, &sealed, max) {
                    Ok(inner) => inner,
                    Err(e) => {
                        ctx.metrics.invalid_msg_total.inc();
                        warn!(session = %session_id, err = %e, "dropping unopenable frame");
                        continue;
                    }
                }
            }
            _ => {
                ctx.metrics.invalid_msg_total.inc();
                warn!(session = %session_id, "unexpected plaintext frame on active session");
                continue;
            }
        };
        route_inbound(&ctx, &session_id, inner, &outbound_tx, &pending).await;
    }
}

/// Dispatch one opened envelope.
async fn route_inbound(
    ctx: &SessionContext,
    session_id: &str,
    envelope: proto::Envelope,
    outbound_tx: &mpsc::Sender<proto::Envelope>,
    pending: &PendingCalls,
) {
    match envelope.body {
        Some(Body::Sync(msg)) => match msg.kind {
            Some(sync_message::Kind::Update(update)) => {
                let schema = ctx.schemas.get(&update.type_name);
                let obj = object_from_update(&update, schema, session_id);
                ctx.metrics.sync_in_total.inc();
                ctx.registry.apply_remote_update(obj);
            }
            Some(sync_message::Kind::Delete(delete)) => {
                ctx.metrics.sync_in_total.inc();
                ctx.registry
                    .apply_remote_delete(&delete.object_id, &delete.type_name);
            }
            None => ctx.metrics.invalid_msg_total.inc(),
        },
        Some(Body::Event(msg)) => {
            let event = event_from_wire(&msg);
            let event_id = event.event_id.clone();
            ctx.metrics.events_in_total.inc();
            ctx.bus.deliver_remote(event, session_id).await;
            let ack = proto::Envelope {
                corr: envelope.corr,
                body: Some(Body::EventAck(proto::EventResponse {
                    success: true,
                    event_id,
                })),
            };
            let _ = outbound_tx.send(ack).await;
        }
        Some(Body::Heartbeat(_)) => {
            // Always answered with the current clock, per protocol.
            let ack = proto::Envelope {
                corr: envelope.corr,
                body: Some(Body::HeartbeatAck(proto::HeartbeatResponse {
                    success: true,
                    server_timestamp_ms: now_ms(),
                })),
            };
            let _ = outbound_tx.send(ack).await;
        }
        Some(Body::EventAck(ack)) => pending.complete(envelope.corr, Body::EventAck(ack)),
        Some(Body::HeartbeatAck(ack)) => pending.complete(envelope.corr, Body::HeartbeatAck(ack)),
        Some(Body::HandshakeRequest(_)) | Some(Body::HandshakeResponse(_)) => {
            ctx.metrics.invalid_msg_total.inc();
            warn!(session = %session_id, "handshake frame on an active session");
        }
        Some(Body::Sealed(_)) => {
            ctx.metrics.invalid_msg_total.inc();
            warn!(session = %session_id, "nested sealed frame");
        }
        None => ctx.metrics.invalid_msg_total.inc(),
    }
}

/// Relay local registry changes to the peer, skipping updates that
/// originated on this session.
async fn outbound_pump(
    ctx: Arc<SessionContext>,
    session_id: String,
    mut changes: ChangeStream,
    outbound_tx: mpsc::Sender<proto::Envelope>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let change = tokio::select! {
            _ = shutdown.changed() => break,
            maybe = changes.recv() => maybe,
        };
        let Some(change) = change else { break };
        let body = match change {
            RegistryChange::Updated(obj) => {
                if obj.origin_session.as_deref() == Some(session_id.as_str()) {
                    // Loop prevention: the peer already holds this value.
                    continue;
                }
                Body::Sync(proto::SyncMessage {
                    kind: Some(sync_message::Kind::Update(object_to_update(
                        &obj,
                        &session_id,
                        now_ms(),
                    ))),
                })
            }
            RegistryChange::Deleted {
                object_id,
                type_name,
            } => Body::Sync(proto::SyncMessage {
                kind: Some(sync_message::Kind::Delete(delete_message(
                    &object_id,
                    &type_name,
                    &session_id,
                    now_ms(),
                ))),
            }),
        };
        ctx.metrics.sync_out_total.inc();
        if outbound_tx
            .send(proto::Envelope { corr: 0, body: Some(body) })
            .await
            .is_err()
        {
            break;
        }
    }
}

/// Probe the peer every keepalive period; close after the configured
/// number of consecutive misses.
async fn heartbeat_task(
    ctx: Arc<SessionContext>,
    session_id: String,
    outbound_tx: mpsc::Sender<proto::Envelope>,
    pending: Arc<PendingCalls>,
    mut shutdown: watch::Receiver<bool>,
    last_heartbeat_ms: Arc<AtomicU64>,
) {
    let tuning = &ctx.config.tuning;
    let mut ticker = interval(tuning.keepalive_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval fires immediately; the first probe doubles as a
    // liveness check right after handshake.
    let mut misses = 0u32;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let (corr, rx) = pending.register();
        let probe = proto::Envelope {
            corr,
            body: Some(Body::Heartbeat(proto::HeartbeatRequest {
                session_id: session_id.clone(),
                timestamp_ms: now_ms(),
            })),
        };
        if outbound_tx.send(probe).await.is_err() {
            pending.discard(corr);
            break;
        }

        match timeout(tuning.keepalive_timeout, rx).await {
            Ok(Ok(Body::HeartbeatAck(ack))) if ack.success => {
                misses = 0;
                last_heartbeat_ms.store(now_ms(), Ordering::Relaxed);
            }
            _ => {
                pending.discard(corr);
                misses += 1;
                ctx.metrics.heartbeat_missed_total.inc();
                warn!(session = %session_id, misses, "heartbeat missed");
                if misses >= tuning.max_missed_heartbeats {
                    warn!(session = %session_id, "heartbeat limit reached; closing session");
                    break;
                }
            }
        }
    }
}
