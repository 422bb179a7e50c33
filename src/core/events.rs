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

//! In-process typed event dispatch.
//!
//! Events flow through a bounded broadcast stream; overflow drops the
//! oldest undispatched entries per subscriber and counts the loss.
//! Registered receivers are invoked only for events arriving from peers,
//! sequentially, awaiting each one — receivers must complete quickly.
//! Delivery is at-most-once per subscriber in-process and best-effort
//! across peers.

use crate::core::types::Event;
use crate::monitoring::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Capacity of the broadcast stream per subscriber.
const EVENT_CAPACITY: usize = 256;

/// A registered event receiver.
#[async_trait]
pub trait EventReceiver: Send + Sync {
    /// Stable receiver id; registration is idempotent per id.
    fn id(&self) -> &str;
    /// Event types this receiver wants. Empty matches all.
    fn event_types(&self) -> Vec<String>;
    /// Handle one event. Awaited sequentially with other receivers.
    async fn on_event(&self, event: &Event);
}

/// An event together with the session it arrived on, if any.
#[derive(Clone, Debug)]
pub(crate) struct TaggedEvent {
    /// The event.
    pub event: Event,
    /// Session id the event arrived on; `None` for locally sent events.
    pub origin_session: Option<String>,
}

/// The event bus.
pub struct EventBus {
    tx: broadcast::Sender<TaggedEvent>,
    receivers: RwLock<Vec<Arc<dyn EventReceiver>>>,
    metrics: Arc<Metrics>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new(metrics: Arc<Metrics>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tx,
            receivers: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Enqueue a locally produced event. Never blocks; with no subscribers
    /// the event is dropped, as events are not stored.
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(TaggedEvent {
            event,
            origin_session: None,
        });
    }

    /// Hot stream of events, optionally restricted to one type.
    pub fn observe(&self, event_type: Option<&str>) -> EventStream {
        EventStream {
            rx: self.tx.subscribe(),
            filter: event_type.map(str::to_string),
            metrics: self.metrics.clone(),
        }
    }

    /// Internal stream carrying origin tags, used by the peer fan-out pump
    /// to avoid echoing a remote event back to the session it came from.
    pub(crate) fn observe_tagged(&self) -> TaggedEventStream {
        TaggedEventStream {
            rx: self.tx.subscribe(),
            metrics: self.metrics.clone(),
        }
    }

    /// Dispatch an event that arrived from a peer: place it on the
    /// broadcast stream, then invoke every matching registered receiver,
    /// sequentially, awaiting each.
    pub async fn deliver_remote(&self, event: Event, origin_session: &str) {
        let _ = self.tx.send(TaggedEvent {
            event: event.clone(),
            origin_session: Some(origin_session.to_string()),
        });

        let receivers = self.receivers.read().await.clone();
        for receiver in receivers {
            let types = receiver.event_types();
            if types.is_empty() || types.iter().any(|t| t == &event.event_type) {
                receiver.on_event(&event).await;
            }
        }
    }

    /// Register a receiver. Idempotent: a receiver with the same id
    /// replaces the previous registration.
    pub async fn register_receiver(&self, receiver: Arc<dyn EventReceiver>) {
        let mut receivers = self.receivers.write().await;
        receivers.retain(|r| r.id() != receiver.id());
        receivers.push(receiver);
    }

    /// Unregister by id. Idempotent.
    pub async fn unregister_receiver(&self, id: &str) {
        let mut receivers = self.receivers.write().await;
        let before = receivers.len();
        receivers.retain(|r| r.id() != id);
        if receivers.len() == before {
            debug!(receiver = %id, "unregister for unknown receiver id");
        }
    }
}

/// Filtered event stream. Lag gaps are counted and skipped.
pub struct EventStream {
    rx: broadcast::Receiver<TaggedEvent>,
    filter: Option<String>,
    metrics: Arc<Metrics>,
}

impl EventStream {
    /// Next matching event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(tagged) => {
                    if let Some(wanted) = &self.filter {
                        if &tagged.event.event_type != wanted {
                            continue;
                        }
                    }
                    return Some(tagged.event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.metrics.events_lagged_total.inc_by(n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Origin-tagged event stream for the fan-out pump.
pub(crate) struct TaggedEventStream {
    rx: broadcast::Receiver<TaggedEvent>,
    metrics: Arc<Metrics>,
}

impl TaggedEventStream {
    /// Next tagged event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<TaggedEvent> {
        loop {
            match self.rx.recv().await {
                Ok(tagged) => return Some(tagged),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.metrics.events_lagged_total.inc_by(n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{EventPriority, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReceiver {
        id: String,
        types: Vec<String>,
        hits: AtomicUsize,
    }

    #[async_trait]
    impl EventReceiver for CountingReceiver {
        fn id(&self) -> &str {
            &self.id
        }
        fn event_types(&self) -> Vec<String> {
            self.types.clone()
        }
        async fn on_event(&self, _event: &Event) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bus() -> EventBus {
        EventBus::new(Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn observe_filters_by_type() {
        let bus = bus();
        let mut notify = bus.observe(Some("notify"));
        let mut all = bus.observe(None);

        bus.send(Event::new("other"));
        bus.send(
            Event::new("notify")
                .with_data("msg", Value::Str("hello".into()))
                .with_priority(EventPriority::High),
        );

        let got = notify.recv().await.unwrap();
        assert_eq!(got.event_type, "notify");
        assert_eq!(got.priority, EventPriority::High);

        assert_eq!(all.recv().await.unwrap().event_type, "other");
        assert_eq!(all.recv().await.unwrap().event_type, "notify");
    }

    #[tokio::test]
    async fn remote_delivery_invokes_matching_receivers_once() {
        let bus = bus();
        let matching = Arc::new(CountingReceiver {
            id: "m".into(),
            types: vec!["notify".into()],
            hits: AtomicUsize::new(0),
        });
        let catch_all = Arc::new(CountingReceiver {
            id: "a".into(),
            types: vec![],
            hits: AtomicUsize::new(0),
        });
        let other = Arc::new(CountingReceiver {
            id: "o".into(),
            types: vec!["something-else".into()],
            hits: AtomicUsize::new(0),
        });
        bus.register_receiver(matching.clone()).await;
        bus.register_receiver(catch_all.clone()).await;
        bus.register_receiver(other.clone()).await;

        bus.deliver_remote(Event::new("notify"), "s-1").await;

        assert_eq!(matching.hits.load(Ordering::SeqCst), 1);
        assert_eq!(catch_all.hits.load(Ordering::SeqCst), 1);
        assert_eq!(other.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registration_is_idempotent() {
        let bus = bus();
        let r1 = Arc::new(CountingReceiver {
            id: "dup".into(),
            types: vec![],
            hits: AtomicUsize::new(0),
        });
        let r2 = Arc::new(CountingReceiver {
            id: "dup".into(),
            types: vec![],
            hits: AtomicUsize::new(0),
        });
        bus.register_receiver(r1.clone()).await;
        bus.register_receiver(r2.clone()).await;

        bus.deliver_remote(Event::new("x"), "s-1").await;
        // Only the latest registration runs.
        assert_eq!(r1.hits.load(Ordering::SeqCst), 0);
        assert_eq!(r2.hits.load(Ordering::SeqCst), 1);

        bus.unregister_receiver("dup").await;
        bus.unregister_receiver("dup").await;
        bus.deliver_remote(Event::new("x"), "s-1").await;
        assert_eq!(r2.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_sends_carry_no_origin() {
        let bus = bus();
        let mut tagged = bus.observe_tagged();
        bus.send(Event::new("local"));
        bus.deliver_remote(Event::new("remote"), "s-7").await;

        let first = tagged.recv().await.unwrap();
        assert_eq!(first.origin_session, None);
        let second = tagged.recv().await.unwrap();
        assert_eq!(second.origin_session.as_deref(), Some("s-7"));
    }
}
