// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

mod common;

use asinka::core::config::AsinkaConfig;
use asinka::core::events::EventReceiver;
use asinka::core::types::{Event, EventPriority, Value};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct RecordingReceiver {
    id: String,
    types: Vec<String>,
    hits: AtomicUsize,
    last: Mutex<Option<Event>>,
}

impl RecordingReceiver {
    fn new(id: &str, types: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            types: types.iter().map(|s| s.to_string()).collect(),
            hits: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }
}

#[async_trait]
impl EventReceiver for RecordingReceiver {
    fn id(&self) -> &str {
        &self.id
    }
    fn event_types(&self) -> Vec<String> {
        self.types.clone()
    }
    async fn on_event(&self, event: &Event) {
        self.hits.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(event.clone());
    }
}

fn peer_config(app_id: &str) -> AsinkaConfig {
    let mut config = AsinkaConfig::new(app_id);
    config.server_port = 0;
    config
}

async fn wait_until<F>(deadline: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread")]
async fn events_reach_remote_receivers_with_priority() {
    let a = common::create_peer(peer_config("com.example.peer-a"));
    let b = common::create_peer(peer_config("com.example.peer-b"));
    a.start().await.unwrap();
    b.start().await.unwrap();

    let receiver = RecordingReceiver::new("notify-sink", &["notify"]);
    a.events().register_receiver(receiver.clone()).await;
    let unrelated = RecordingReceiver::new("other-sink", &["something-else"]);
    a.events().register_receiver(unrelated.clone()).await;

    let a_port = a.local_port().await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();
    // Give A's side of the session a beat to finish installing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    b.events().send(
        Event::new("notify")
            .with_data("msg", Value::Str("hello".into()))
            .with_priority(EventPriority::High),
    );

    assert!(
        wait_until(Duration::from_secs(2), || {
            receiver.hits.load(Ordering::SeqCst) == 1
        })
        .await,
        "receiver was never invoked"
    );
    let got = receiver.last.lock().unwrap().clone().unwrap();
    assert_eq!(got.event_type, "notify");
    assert_eq!(got.data.get("msg"), Some(&Value::Str("hello".into())));
    assert_eq!(got.priority, EventPriority::High);
    assert_eq!(unrelated.hits.load(Ordering::SeqCst), 0);

    // Still exactly one invocation after the dust settles.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(receiver.hits.load(Ordering::SeqCst), 1);

    a.stop().await;
    b.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_events_appear_on_observe_streams() {
    let a = common::create_peer(peer_config("com.example.peer-a"));
    let b = common::create_peer(peer_config("com.example.peer-b"));
    a.start().await.unwrap();
    b.start().await.unwrap();

    let mut stream = a.events().observe(Some("ping"));

    let a_port = a.local_port().await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    b.events().send(Event::new("ping").with_data("n", Value::I64(1)));

    let got = tokio::time::timeout(Duration::from_secs(2), stream.recv())
        .await
        .expect("event never arrived")
        .expect("stream ended");
    assert_eq!(got.event_type, "ping");
    assert_eq!(got.data.get("n"), Some(&Value::I64(1)));

    a.stop().await;
    b.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_events_are_not_echoed_back_to_their_origin() {
    let a = common::create_peer(peer_config("com.example.peer-a"));
    let b = common::create_peer(peer_config("com.example.peer-b"));
    a.start().await.unwrap();
    b.start().await.unwrap();

    let a_port = a.local_port().await.unwrap();
    b.connect("127.0.0.1", a_port).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    b.events().send(Event::new("once"));
    assert!(
        wait_until(Duration::from_secs(2), || {
            a.metrics().events_in_total.get() == 1
        })
        .await,
        "event never delivered"
    );

    // A's fan-out pump saw the delivered event; it must not bounce it back
    // to B, and B must not relay it again.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(b.metrics().events_in_total.get(), 0);
    assert_eq!(a.metrics().events_in_total.get(), 1);

    a.stop().await;
    b.stop().await;
}
