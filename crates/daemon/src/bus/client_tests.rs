// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use tokio::net::TcpListener;

// -- Backoff ------------------------------------------------------------------

#[test]
fn backoff_doubles_per_attempt() {
    assert_eq!(backoff_delay(0, 1000), Duration::from_millis(1000));
    assert_eq!(backoff_delay(1, 1000), Duration::from_millis(2000));
    assert_eq!(backoff_delay(2, 1000), Duration::from_millis(4000));
    assert_eq!(backoff_delay(3, 1000), Duration::from_millis(8000));
}

#[test]
fn backoff_caps_at_thirty_seconds() {
    assert_eq!(backoff_delay(6, 1000), Duration::from_secs(30));
    assert_eq!(backoff_delay(63, 1000), Duration::from_secs(30));
    assert_eq!(backoff_delay(200, 1000), Duration::from_secs(30));
}

// -- Snapshot parsing ---------------------------------------------------------

#[test]
fn snapshot_parses_nested_clients() {
    let body = r#"{
        "aps": [
            {
                "mac": "aa:bb:cc:dd:ee:ff",
                "hostname": "HomeNet",
                "rssi": -55,
                "channel": 11,
                "encryption": "WPA2",
                "clients": [
                    {"mac": "11:22:33:44:55:66", "rssi": -70},
                    {"mac": "11:22:33:44:55:67", "rssi": -71}
                ]
            },
            {"mac": "aa:bb:cc:dd:ee:00", "hostname": "Empty", "clients": []}
        ]
    }"#;

    let (aps, stations) = parse_wifi_snapshot(body).unwrap();
    assert_eq!(aps.len(), 2);
    assert_eq!(stations.len(), 2);
    assert_eq!(aps[0].ssid, "HomeNet");
    assert_eq!(aps[0].clients, 2);
    assert_eq!(stations[0].ap_bssid.to_string(), "aa:bb:cc:dd:ee:ff");
    assert!(stations[0].associated);
}

#[test]
fn snapshot_rejects_garbage() {
    assert!(parse_wifi_snapshot("not json").is_none());
    assert!(parse_wifi_snapshot(r#"{"sessions": []}"#).is_none());
}

// -- Command sender -----------------------------------------------------------

async fn respond(sock: &mut tokio::net::TcpStream, body: &str) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    let mut buf = [0u8; 4096];
    let _ = sock.read(&mut buf).await.unwrap();
    let resp =
        format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}", body.len(), body);
    sock.write_all(resp.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn send_command_accepts_success() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        respond(&mut sock, r#"{"success":true}"#).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let http = Arc::new(Mutex::new(KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p")));
    let sender = CommandSender::new(http);
    sender.send_command("wifi.recon on").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn send_command_retries_once_on_rejection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        {
            let (mut sock, _) = listener.accept().await.unwrap();
            respond(&mut sock, r#"{"success":false}"#).await;
        }
        // The client must come back on a fresh connection.
        let (mut sock, _) = listener.accept().await.unwrap();
        respond(&mut sock, r#"{"success":true}"#).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let http = Arc::new(Mutex::new(KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p")));
    let sender = CommandSender::new(http);
    sender.send_command("wifi.assoc aa:bb:cc:dd:ee:ff").await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn send_command_fails_after_second_rejection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        for _ in 0..2 {
            let (mut sock, _) = listener.accept().await.unwrap();
            respond(&mut sock, r#"{"success":false}"#).await;
        }
    });

    let http = Arc::new(Mutex::new(KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p")));
    let sender = CommandSender::new(http);
    assert!(sender.send_command("wifi.deauth 11:22:33:44:55:66").await.is_err());
    server.await.unwrap();
}
