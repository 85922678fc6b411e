// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent keep-alive HTTP/1.1 client for the capture engine's REST API.
//!
//! One TCP connection to the loopback endpoint is held open across requests.
//! Before reuse the socket is probed without blocking: a FIN from the peer
//! or stale unread bytes (leftovers of a chunked response) drop the
//! connection and a fresh one is dialed. A request that fails mid-flight is
//! retried once on a new connection.

use std::time::Duration;

use anyhow::{bail, Context};
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed response: status code and (first chunk of the) body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Keep-alive client bound to one host:port with cached Basic auth.
pub struct KeepAliveHttp {
    host: String,
    port: u16,
    authorization: String,
    stream: Option<TcpStream>,
}

impl KeepAliveHttp {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            authorization: basic_auth(username, password),
            stream: None,
        }
    }

    pub async fn get(&mut self, path: &str) -> anyhow::Result<HttpResponse> {
        self.request("GET", path, None).await
    }

    pub async fn post_json(&mut self, path: &str, body: &str) -> anyhow::Result<HttpResponse> {
        self.request("POST", path, Some(body)).await
    }

    /// Drop the connection; the next request dials fresh.
    pub fn close(&mut self) {
        self.stream = None;
    }

    async fn request(
        &mut self,
        method: &str,
        path: &str,
        body: Option<&str>,
    ) -> anyhow::Result<HttpResponse> {
        let wire = self.build_request(method, path, body);
        // First attempt may ride a connection the peer already closed;
        // retry exactly once on a fresh dial.
        match self.attempt(&wire).await {
            Ok(resp) => Ok(resp),
            Err(first) => {
                tracing::debug!(err = %first, %method, %path, "keep-alive request failed, redialing");
                self.close();
                self.attempt(&wire).await
            }
        }
    }

    fn build_request(&self, method: &str, path: &str, body: Option<&str>) -> String {
        let body = body.unwrap_or("");
        format!(
            "{method} {path} HTTP/1.1\r\n\
             Host: {host}:{port}\r\n\
             Authorization: {auth}\r\n\
             Connection: keep-alive\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {len}\r\n\
             \r\n\
             {body}",
            host = self.host,
            port = self.port,
            auth = self.authorization,
            len = body.len(),
        )
    }

    async fn attempt(&mut self, wire: &str) -> anyhow::Result<HttpResponse> {
        let stream = self.ensure_connected().await?;
        let io = async {
            stream.write_all(wire.as_bytes()).await?;
            read_response(stream).await
        };
        let outcome = tokio::time::timeout(REQUEST_TIMEOUT, io).await;
        match outcome {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => {
                self.close();
                Err(e)
            }
            Err(_) => {
                self.close();
                bail!("request timed out after {REQUEST_TIMEOUT:?}")
            }
        }
    }

    async fn ensure_connected(&mut self) -> anyhow::Result<&mut TcpStream> {
        if let Some(ref stream) = self.stream {
            if !socket_is_reusable(stream) {
                self.stream = None;
            }
        }
        if self.stream.is_none() {
            let addr = format!("{}:{}", self.host, self.port);
            let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
                .await
                .with_context(|| format!("connect to {addr} timed out"))??;
            stream.set_nodelay(true)?;
            self.stream = Some(stream);
        }
        // The option was just filled; the or-branch is unreachable.
        self.stream.as_mut().ok_or_else(|| anyhow::anyhow!("connection missing"))
    }
}

/// Non-blocking reuse probe: `Ok(0)` is a FIN, `Ok(n)` is stale unread data
/// (both unusable); only `WouldBlock` means the socket is idle and healthy.
fn socket_is_reusable(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 16];
    match stream.try_read(&mut probe) {
        Ok(_) => false,
        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
        Err(_) => false,
    }
}

async fn read_response(stream: &mut TcpStream) -> anyhow::Result<HttpResponse> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf) {
            break pos;
        }
        let mut chunk = [0u8; 2048];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            bail!("connection closed before response headers completed");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let status = parse_status_line(&head).context("malformed status line")?;
    let chunked = header_value(&head, "transfer-encoding")
        .map(|v| v.eq_ignore_ascii_case("chunked"))
        .unwrap_or(false);
    let content_length: Option<usize> =
        header_value(&head, "content-length").and_then(|v| v.parse().ok());

    let mut rest = buf.split_off(head_end + 4);

    let body = if chunked {
        // Callers only need the first JSON blob; decode the first chunk and
        // leave the remainder for the reuse probe to flush via redial.
        read_first_chunk(stream, &mut rest).await?
    } else if let Some(len) = content_length {
        while rest.len() < len {
            let mut chunk = [0u8; 2048];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                bail!("connection closed mid-body");
            }
            rest.extend_from_slice(&chunk[..n]);
        }
        rest.truncate(len);
        rest
    } else {
        rest
    };

    Ok(HttpResponse { status, body: String::from_utf8_lossy(&body).into_owned() })
}

async fn read_first_chunk(stream: &mut TcpStream, rest: &mut Vec<u8>) -> anyhow::Result<Vec<u8>> {
    // Accumulate until the chunk-size line and the full chunk are present.
    loop {
        if let Some(line_end) = find_crlf(rest) {
            let size_line = String::from_utf8_lossy(&rest[..line_end]).into_owned();
            let size_hex = size_line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_hex, 16)
                .with_context(|| format!("bad chunk size {size_hex:?}"))?;
            if rest.len() >= line_end + 2 + size {
                return Ok(rest[line_end + 2..line_end + 2 + size].to_vec());
            }
        }
        let mut chunk = [0u8; 2048];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            bail!("connection closed mid-chunk");
        }
        rest.extend_from_slice(&chunk[..n]);
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_status_line(head: &str) -> Option<u16> {
    let line = head.lines().next()?;
    line.split_whitespace().nth(1)?.parse().ok()
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then_some(value.trim())
    })
}

/// Precompute the `Authorization` header value.
fn basic_auth(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
