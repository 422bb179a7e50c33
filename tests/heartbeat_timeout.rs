// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

mod common;

use asinka::core::config::AsinkaConfig;
use asinka::core::security::SecurityEnvelope;
use asinka::networking::handshake;
use asinka::networking::transport::split_framed;
use asinka::wire::proto::{self, envelope::Body};
use std::time::Duration;
use tokio::net::TcpListener;

/// A peer that completes the handshake and then goes silent: it keeps the
/// TCP connection open, reads frames, and never answers anything.
async fn spawn_silent_peer() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let (mut reader, mut writer) = split_framed(stream, 4 * 1024 * 1024);
        let config = AsinkaConfig::new("com.example.silent");
        let security = SecurityEnvelope::new().unwrap();

        let Ok(first) = reader.read_envelope().await else {
            return;
        };
        let Some(Body::HandshakeRequest(request)) = first.body else {
            return;
        };
        let agreement = security.begin_agreement().unwrap();
        let (response, _accepted) =
            handshake::process_request(&request, &config, &security, agreement.public_key());
        if writer
            .write_envelope(&proto::Envelope {
                corr: first.corr,
                body: Some(Body::HandshakeResponse(response)),
            })
            .await
            .is_err()
        {
            return;
        }

        // From here on: swallow every frame, answer nothing.
        while reader.read_envelope().await.is_ok() {}
    });
    port
}

#[tokio::test(flavor = "multi_thread")]
async fn three_missed_heartbeats_close_the_session() {
    let mut config = AsinkaConfig::new("com.example.prober");
    config.server_port = 0;
    // Tight keepalive so the three-miss teardown runs in test time.
    config.tuning.keepalive_period = Duration::from_millis(100);
    config.tuning.keepalive_timeout = Duration::from_millis(80);
    let client = common::create_peer(config);
    client.start().await.unwrap();

    let port = spawn_silent_peer().await;
    let session = client.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(client.sessions().await.len(), 1);
    assert_eq!(client.sessions().await[0].session_id, session.session_id);

    // Three consecutive misses at 100ms/80ms come due well inside 3s.
    let start = tokio::time::Instant::now();
    while !client.sessions().await.is_empty() && start.elapsed() < Duration::from_secs(3) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert!(
        client.sessions().await.is_empty(),
        "session survived a dead peer"
    );
    assert!(
        client.metrics().heartbeat_missed_total.get() >= 3,
        "expected three misses, saw {}",
        client.metrics().heartbeat_missed_total.get()
    );

    client.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn heartbeats_keep_a_live_session_open() {
    let mut config_a = AsinkaConfig::new("com.example.peer-a");
    config_a.server_port = 0;
    config_a.tuning.keepalive_period = Duration::from_millis(100);
    config_a.tuning.keepalive_timeout = Duration::from_millis(80);
    let mut config_b = AsinkaConfig::new("com.example.peer-b");
    config_b.server_port = 0;

    let a = common::create_peer(config_a);
    let b = common::create_peer(config_b);
    a.start().await.unwrap();
    b.start().await.unwrap();

    let b_port = b.local_port().await.unwrap();
    a.connect("127.0.0.1", b_port).await.unwrap();

    // Several heartbeat periods pass; the live peer answers every probe.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let sessions = a.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(a.metrics().heartbeat_missed_total.get(), 0);
    // The last-heartbeat stamp has been refreshed since establishment.
    assert!(sessions[0].last_heartbeat_ms >= sessions[0].established_at_ms);

    a.stop().await;
    b.stop().await;
}
