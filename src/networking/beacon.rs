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

//! Bundled LAN discovery provider.
//!
//! For hosts without a native mDNS daemon: presence datagrams on the mDNS
//! multicast group (224.0.0.251, UDP/5353), one every two seconds, with a
//! magic prefix and a size-capped canonical encoding. A peer is `Lost`
//! after three missed periods or on an explicit goodbye. OS name-service
//! integration stays behind the [`DiscoveryProvider`] port.

use crate::core::types::{decode_canonical_limited, encode_canonical};
use crate::networking::discovery::{
    AdvertiseEvent, AdvertiseHandle, DiscoveryError, DiscoveryEvent, DiscoveryHandle,
    DiscoveryProvider, ServiceInfo, SERVICE_TYPE,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Multicast group beacons travel on.
const BEACON_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
/// Beacon port.
const BEACON_PORT: u16 = 5353;
/// Magic prefix distinguishing Asinka beacons from unrelated traffic.
const BEACON_MAGIC: &[u8] = b"ASNKB1";
/// Interval between presence beacons.
const BEACON_PERIOD: Duration = Duration::from_secs(2);
/// Missed periods before a peer is declared lost.
const BEACON_TTL_PERIODS: u32 = 3;
/// Hard cap on a beacon datagram.
const MAX_BEACON_BYTES: usize = 4096;
/// Event channel capacity per handle.
const EVENT_CAPACITY: usize = 64;

/// One presence datagram.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct BeaconPayload {
    /// Full service name.
    service_name: String,
    /// Service type tag.
    type_tag: String,
    /// TCP port the peer accepts sessions on.
    port: u16,
    /// Free-form attributes.
    attrs: BTreeMap<String, String>,
    /// True on the final beacon before retraction.
    goodbye: bool,
}

fn encode_beacon(payload: &BeaconPayload) -> Option<Vec<u8>> {
    let body = encode_canonical(payload).ok()?;
    let mut out = Vec::with_capacity(BEACON_MAGIC.len() + body.len());
    out.extend_from_slice(BEACON_MAGIC);
    out.extend_from_slice(&body);
    Some(out)
}

fn decode_beacon(datagram: &[u8]) -> Option<BeaconPayload> {
    let body = datagram.strip_prefix(BEACON_MAGIC)?;
    decode_canonical_limited(body, MAX_BEACON_BYTES).ok()
}

/// Receiver socket bound to the beacon port with address reuse, so several
/// processes on one host can all listen.
fn bind_multicast() -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, BEACON_PORT).into())?;
    socket.join_multicast_v4(&BEACON_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    UdpSocket::from_std(socket.into())
}

/// Sender socket on an ephemeral port, loopback enabled so same-host peers
/// hear each other.
async fn bind_sender() -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;
    Ok(socket)
}

/// The bundled provider.
pub struct LanBeacon {
    local_name: String,
    attrs: BTreeMap<String, String>,
}

impl LanBeacon {
    /// Create a provider that suppresses loopback sightings of
    /// `local_name` and attaches `attrs` to every beacon.
    pub fn new(local_name: impl Into<String>, attrs: BTreeMap<String, String>) -> Self {
        Self {
            local_name: local_name.into(),
            attrs,
        }
    }
}

#[async_trait]
impl DiscoveryProvider for LanBeacon {
    async fn advertise(
        &self,
        service_name: &str,
        port: u16,
    ) -> Result<AdvertiseHandle, DiscoveryError> {
        let socket = bind_sender()
            .await
            .map_err(|e| DiscoveryError::Bind(e.to_string()))?;
        let payload = BeaconPayload {
            service_name: service_name.to_string(),
            type_tag: SERVICE_TYPE.to_string(),
            port,
            attrs: self.attrs.clone(),
            goodbye: false,
        };

        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let target = SocketAddr::from((BEACON_GROUP, BEACON_PORT));

        tokio::spawn(async move {
            let Some(bytes) = encode_beacon(&payload) else {
                let _ = event_tx
                    .send(AdvertiseEvent::Error {
                        code: 0,
                        message: "beacon encode failed".to_string(),
                    })
                    .await;
                return;
            };
            let _ = event_tx.send(AdvertiseEvent::Idle).await;

            let mut ticker = interval(BEACON_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut announced = false;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        match socket.send_to(&bytes, target).await {
                            Ok(_) if !announced => {
                                announced = true;
                                info!(service = %payload.service_name, port, "advertising");
                                let _ = event_tx.send(AdvertiseEvent::Advertising).await;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(err = %e, "beacon send failed");
                                let _ = event_tx
                                    .send(AdvertiseEvent::Error {
                                        code: e.raw_os_error().unwrap_or(0),
                                        message: e.to_string(),
                                    })
                                    .await;
                            }
                        }
                    }
                }
            }

            // Retraction: best-effort goodbye so peers drop us immediately.
            let goodbye = BeaconPayload {
                goodbye: true,
                ..payload
            };
            if let Some(bytes) = encode_beacon(&goodbye) {
                let _ = socket.send_to(&bytes, target).await;
            }
            debug!("advertisement retracted");
        });

        Ok(AdvertiseHandle::new(event_rx, stop_tx))
    }

    async fn discover(&self) -> Result<DiscoveryHandle, DiscoveryError> {
        let socket = bind_multicast().map_err(|e| DiscoveryError::Bind(e.to_string()))?;
        let local_name = self.local_name.clone();

        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        tokio::spawn(async move {
            let ttl = BEACON_PERIOD * BEACON_TTL_PERIODS;
            let mut seen: HashMap<String, (Instant, ServiceInfo)> = HashMap::new();
            let mut buf = vec![0u8; MAX_BEACON_BYTES + BEACON_MAGIC.len()];
            let mut sweep = interval(BEACON_PERIOD);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = sweep.tick() => {
                        let now = Instant::now();
                        let expired: Vec<String> = seen
                            .iter()
                            .filter(|(_, (last, _))| now.duration_since(*last) > ttl)
                            .map(|(name, _)| name.clone())
                            .collect();
                        for name in expired {
                            seen.remove(&name);
                            debug!(service = %name, "peer expired");
                            let _ = event_tx.send(DiscoveryEvent::Lost(name)).await;
                        }
                    }
                    received = socket.recv_from(&mut buf) => {
                        let (len, from) = match received {
                            Ok(v) => v,
                            Err(e) => {
                                warn!(err = %e, "beacon recv failed");
                                let _ = event_tx
                                    .send(DiscoveryEvent::Error {
                                        code: e.raw_os_error().unwrap_or(0),
                                        message: e.to_string(),
                                    })
                                    .await;
                                continue;
                            }
                        };
                        let Some(payload) = decode_beacon(&buf[..len]) else {
                            continue;
                        };
                        if payload.service_name == local_name {
                            continue;
                        }
                        if payload.goodbye {
                            if seen.remove(&payload.service_name).is_some() {
                                let _ = event_tx
                                    .send(DiscoveryEvent::Lost(payload.service_name))
                                    .await;
                            }
                            continue;
                        }

                        let info = ServiceInfo {
                            name: payload.service_name.clone(),
                            type_tag: payload.type_tag,
                            host: from.ip().to_string(),
                            port: payload.port,
                            attrs: payload.attrs,
                        };
                        let changed = match seen.get(&payload.service_name) {
                            Some((_, known)) => known != &info,
                            None => true,
                        };
                        seen.insert(payload.service_name.clone(), (Instant::now(), info.clone()));
                        if changed {
                            info!(service = %info.name, host = %info.host, port = info.port, "peer found");
                            let _ = event_tx.send(DiscoveryEvent::Found(info)).await;
                        }
                    }
                }
            }
            debug!("discovery watch stopped");
        });

        Ok(DiscoveryHandle::new(event_rx, stop_tx))
    }
}
