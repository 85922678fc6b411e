// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use proptest::prelude::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// -- Header parsing -----------------------------------------------------------

#[test]
fn status_line_parses() {
    assert_eq!(parse_status_line("HTTP/1.1 200 OK\r\n"), Some(200));
    assert_eq!(parse_status_line("HTTP/1.1 404 Not Found\r\n"), Some(404));
    assert_eq!(parse_status_line("garbage"), None);
}

#[test]
fn header_lookup_is_case_insensitive() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 42\r\nTransfer-Encoding: chunked";
    assert_eq!(header_value(head, "content-length"), Some("42"));
    assert_eq!(header_value(head, "TRANSFER-ENCODING"), Some("chunked"));
    assert_eq!(header_value(head, "x-missing"), None);
}

#[test]
fn basic_auth_is_rfc_formatted() {
    // RFC 7617 example credentials.
    assert_eq!(basic_auth("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
}

proptest! {
    #[test]
    fn base64_round_trip(bytes in prop::collection::vec(any::<u8>(), 16)) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let decoded = base64::engine::general_purpose::STANDARD.decode(&encoded).unwrap();
        prop_assert_eq!(decoded, bytes);
    }
}

// -- Request framing ----------------------------------------------------------

#[test]
fn request_carries_auth_and_length() {
    let client = KeepAliveHttp::new("127.0.0.1", 8081, "user", "pass");
    let wire = client.build_request("POST", "/api/session", Some("{\"cmd\":\"wifi.recon on\"}"));
    assert!(wire.starts_with("POST /api/session HTTP/1.1\r\n"));
    assert!(wire.contains("Authorization: Basic dXNlcjpwYXNz\r\n"));
    assert!(wire.contains("Connection: keep-alive\r\n"));
    assert!(wire.contains("Content-Length: 23\r\n"));
    assert!(wire.ends_with("\r\n\r\n{\"cmd\":\"wifi.recon on\"}"));
}

// -- Live socket behavior -----------------------------------------------------

async fn bind_server() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn serve_once(listener: &TcpListener, response: &str) {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 4096];
    let _ = sock.read(&mut buf).await.unwrap();
    sock.write_all(response.as_bytes()).await.unwrap();
    sock.flush().await.unwrap();
    // Keep the socket open so keep-alive reuse can be observed.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
}

#[tokio::test]
async fn content_length_body_is_read_exactly() {
    let (listener, addr) = bind_server().await;
    let server = tokio::spawn(async move {
        serve_once(
            &listener,
            "HTTP/1.1 200 OK\r\nContent-Length: 16\r\n\r\n{\"success\":true}",
        )
        .await;
    });

    let mut client = KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p");
    let resp = client.get("/api/session/wifi").await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "{\"success\":true}");
    assert!(resp.is_ok());
    server.await.unwrap();
}

#[tokio::test]
async fn chunked_response_yields_first_chunk_only() {
    let (listener, addr) = bind_server().await;
    let server = tokio::spawn(async move {
        serve_once(
            &listener,
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
             b\r\n{\"aps\":[]}\n\r\n5\r\ntrail\r\n0\r\n\r\n",
        )
        .await;
    });

    let mut client = KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p");
    let resp = client.get("/api/session/wifi").await.unwrap();
    assert_eq!(resp.body, "{\"aps\":[]}\n");
    server.await.unwrap();
}

#[tokio::test]
async fn stale_fin_socket_redials() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        // First request served, then the server closes the connection.
        {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await.unwrap();
        } // dropped: FIN
        // Second dial must arrive after the client notices the dead socket.
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let _ = sock.read(&mut buf).await.unwrap();
        sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nagain").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    });

    let mut client = KeepAliveHttp::new("127.0.0.1", addr.port(), "u", "p");
    assert_eq!(client.get("/one").await.unwrap().body, "ok");
    // Give the FIN time to land so the reuse probe sees it.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(client.get("/two").await.unwrap().body, "again");
    server.await.unwrap();
}

#[tokio::test]
async fn connection_refused_surfaces_error() {
    // Port 1 on loopback is essentially never listening.
    let mut client = KeepAliveHttp::new("127.0.0.1", 1, "u", "p");
    assert!(client.get("/x").await.is_err());
}
