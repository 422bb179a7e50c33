// Copyright (c) 2026 Asinka
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

mod common;

use asinka::core::config::AsinkaConfig;
use asinka::networking::session::ConnectError;
use asinka::networking::transport::TransportError;
use std::time::Duration;
use tokio::net::TcpListener;

fn quick_config() -> AsinkaConfig {
    let mut config = AsinkaConfig::new("com.example.dialer");
    config.server_port = 0;
    config.tuning.handshake_deadline = Duration::from_millis(300);
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn connecting_to_a_closed_port_fails_fast() {
    let client = common::create_peer(quick_config());
    // Bind-then-drop guarantees an unused port.
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = client.connect("127.0.0.1", port).await.unwrap_err();
    assert!(matches!(err, ConnectError::Transport(_)), "got {err:?}");
    assert!(client.sessions().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn a_mute_listener_trips_the_handshake_deadline() {
    let client = common::create_peer(quick_config());
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accept and hold the socket without ever answering.
    let hold = tokio::spawn(async move {
        let _conn = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let err = client.connect("127.0.0.1", port).await.unwrap_err();
    assert!(
        matches!(err, ConnectError::Transport(TransportError::Deadline)),
        "got {err:?}"
    );
    assert!(client.sessions().await.is_empty());
    hold.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_dials_leave_the_client_usable() {
    let a = common::create_peer(quick_config());
    let b = common::create_peer(quick_config());
    a.start().await.unwrap();
    b.start().await.unwrap();

    let dead_port = {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    };
    assert!(b.connect("127.0.0.1", dead_port).await.is_err());

    // The failure left no residue; a real dial still works.
    let a_port = a.local_port().await.unwrap();
    let session = b.connect("127.0.0.1", a_port).await.unwrap();
    assert!(!session.session_id.is_empty());
    assert_eq!(b.sessions().await.len(), 1);

    a.stop().await;
    b.stop().await;
}
