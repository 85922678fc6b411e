// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end bus client tests against a hand-rolled fake engine: raw TCP,
//! HTTP 101 upgrade, unmasked server frames.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pupd::bus::frame::{decode_frame, Opcode};
use pupd::bus::{spawn_bus_client, BusConfig, BusEvent};
use pupd::topology::TopologyStore;

fn test_config(port: u16) -> BusConfig {
    BusConfig {
        host: "127.0.0.1".to_owned(),
        port,
        path: "/api/events".to_owned(),
        username: "user".to_owned(),
        password: "pass".to_owned(),
        auto_reconnect: false,
        max_reconnect_attempts: 0,
        reconnect_delay_ms: 100,
        heartbeat_interval_ms: 60_000,
    }
}

/// Accept one client and complete the WebSocket upgrade, returning the
/// stream and the raw request head.
async fn accept_ws(listener: &TcpListener) -> (TcpStream, String) {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut buf: Vec<u8> = Vec::new();
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let mut chunk = [0u8; 1024];
        let n = sock.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up during upgrade");
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    sock.write_all(
        b"HTTP/1.1 101 Switching Protocols\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Accept: irrelevant\r\n\r\n",
    )
    .await
    .unwrap();
    (sock, head)
}

/// Read one client frame (masked) off the socket.
async fn read_client_frame(sock: &mut TcpStream, buf: &mut Vec<u8>) -> (Opcode, Vec<u8>) {
    loop {
        if let Ok(Some((frame, used))) = decode_frame(buf) {
            buf.drain(..used);
            return (frame.opcode, frame.payload.to_vec());
        }
        let mut chunk = [0u8; 1024];
        let n = sock.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Server-side unmasked text frame.
fn text_frame(payload: &str) -> Vec<u8> {
    let bytes = payload.as_bytes();
    let mut out = vec![0x81u8];
    if bytes.len() <= 125 {
        out.push(bytes.len() as u8);
    } else {
        out.push(126);
        out.extend((bytes.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(bytes);
    out
}

async fn wait_for<F, Fut>(mut probe: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if probe().await {
            return;
        }
        assert!(Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// -- Scenario: upgrade, subscribe, first event --------------------------------

#[tokio::test]
async fn handshake_and_first_event() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut sock, head) = accept_ws(&listener).await;
        assert!(head.contains("GET /api/events HTTP/1.1"));
        assert!(head.contains("Upgrade: websocket"));
        assert!(head.contains("Sec-WebSocket-Version: 13"));
        assert!(head.contains("Sec-WebSocket-Key: "));
        assert!(head.contains("Authorization: Basic dXNlcjpwYXNz"));

        let mut buf = Vec::new();
        let (opcode, payload) = read_client_frame(&mut sock, &mut buf).await;
        assert_eq!(opcode, Opcode::Text);
        let sub: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(sub["cmd"], "events.stream");
        assert_eq!(sub["args"]["filter"], "wifi.*");

        sock.write_all(&text_frame(
            r#"{"tag":"wifi.ap.new","data":{"mac":"aa:bb:cc:dd:ee:ff","hostname":"MyAP","rssi":-60,"channel":6,"encryption":"WPA2"}}"#,
        ))
        .await
        .unwrap();
        // Hold the session open until the client is cancelled.
        let mut chunk = [0u8; 1024];
        let _ = sock.read(&mut chunk).await;
    });

    let store = Arc::new(TopologyStore::new());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = spawn_bus_client(test_config(port), Arc::clone(&store), events_tx, cancel.clone());

    wait_for(|| {
        let store = Arc::clone(&store);
        async move { store.snapshot_ap_count().await == 1 }
    })
    .await;

    let bssid = "aa:bb:cc:dd:ee:ff".parse().unwrap();
    let ap = store.find_ap_by_bssid(bssid).await.unwrap();
    assert_eq!(ap.ssid, "MyAP");
    assert_eq!(ap.rssi, -60);
    assert_eq!(ap.channel, 6);
    assert_eq!(ap.encryption, "WPA2");

    // The coordinator channel got the same event, in order.
    let event = events_rx.recv().await.unwrap();
    assert!(matches!(event, BusEvent::ApNew(ref data) if data.mac == bssid));

    cancel.cancel();
    let _ = client.await;
    server.abort();
}

// -- Scenario: ap.lost cascades station removal -------------------------------

#[tokio::test]
async fn ap_lost_cascades_clients() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut sock, _) = accept_ws(&listener).await;
        let mut buf = Vec::new();
        let _ = read_client_frame(&mut sock, &mut buf).await; // subscription

        for event in [
            r#"{"tag":"wifi.ap.new","data":{"mac":"aa:bb:cc:dd:ee:ff","hostname":"MyAP","rssi":-60,"channel":6}}"#,
            r#"{"tag":"wifi.client.new","data":{"mac":"11:22:33:44:55:66","ap":"aa:bb:cc:dd:ee:ff","rssi":-70}}"#,
        ] {
            sock.write_all(&text_frame(event)).await.unwrap();
        }
        // Let the client apply both before the loss.
        tokio::time::sleep(Duration::from_millis(200)).await;
        sock.write_all(&text_frame(
            r#"{"tag":"wifi.ap.lost","data":{"mac":"aa:bb:cc:dd:ee:ff"}}"#,
        ))
        .await
        .unwrap();
        let mut chunk = [0u8; 1024];
        let _ = sock.read(&mut chunk).await;
    });

    let store = Arc::new(TopologyStore::new());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = spawn_bus_client(test_config(port), Arc::clone(&store), events_tx, cancel.clone());

    // Populated first...
    wait_for(|| {
        let store = Arc::clone(&store);
        async move { store.snapshot_sta_count().await == 1 }
    })
    .await;
    // ...then emptied by the cascade.
    wait_for(|| {
        let store = Arc::clone(&store);
        async move {
            store.snapshot_ap_count().await == 0 && store.snapshot_sta_count().await == 0
        }
    })
    .await;

    cancel.cancel();
    let _ = client.await;
    server.abort();
}

// -- Control frames -----------------------------------------------------------

#[tokio::test]
async fn server_ping_is_echoed_as_pong() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut sock, _) = accept_ws(&listener).await;
        let mut buf = Vec::new();
        let _ = read_client_frame(&mut sock, &mut buf).await; // subscription

        // Unmasked PING with a payload the client must echo.
        let mut ping = vec![0x89u8, 4];
        ping.extend(b"beat");
        sock.write_all(&ping).await.unwrap();

        let (opcode, payload) = read_client_frame(&mut sock, &mut buf).await;
        assert_eq!(opcode, Opcode::Pong);
        assert_eq!(payload, b"beat");
    });

    let store = Arc::new(TopologyStore::new());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let client = spawn_bus_client(test_config(port), store, events_tx, cancel.clone());

    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    cancel.cancel();
    let _ = client.await;
}

// -- Scenario: reconnect with growing backoff ---------------------------------

#[tokio::test]
async fn reconnect_backoff_grows_until_attempt_cap() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (times_tx, mut times_rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        // Complete every upgrade, then slam the connection shut.
        loop {
            let (sock, _) = accept_ws(&listener).await;
            let _ = times_tx.send(Instant::now());
            drop(sock);
        }
    });

    let store = Arc::new(TopologyStore::new());
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let config = BusConfig {
        auto_reconnect: true,
        max_reconnect_attempts: 2,
        reconnect_delay_ms: 100,
        ..test_config(port)
    };
    let client = spawn_bus_client(config, store, events_tx, cancel.clone());

    // The client gives up after the cap, ending its task.
    tokio::time::timeout(Duration::from_secs(10), client).await.unwrap().unwrap();

    let mut times = Vec::new();
    while let Ok(t) = times_rx.try_recv() {
        times.push(t);
    }
    assert_eq!(times.len(), 3, "initial attempt plus two retries");
    // Exponential floor: jitter only ever adds delay.
    let gap1 = times[1] - times[0];
    let gap2 = times[2] - times[1];
    assert!(gap1 >= Duration::from_millis(100), "first gap {gap1:?}");
    assert!(gap2 >= Duration::from_millis(200), "second gap {gap2:?}");

    server.abort();
}
