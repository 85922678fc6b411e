// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket event bus client.
//!
//! Owns the connection lifecycle: DNS resolution, TCP connect with timeout,
//! HTTP/1.1 upgrade, the subscription message, the receive loop, heartbeat
//! pings, and jittered exponential reconnect. Events mutate the topology
//! store in arrival order and are forwarded to the coordinator channel.
//! A background task reconciles the store against the REST snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use base64::Engine;
use rand::{Rng, RngCore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::bus::events::{parse_event, BusEvent};
use crate::bus::frame::{decode_frame, encode_masked, Opcode};
use crate::bus::http::KeepAliveHttp;
use crate::topology::{epoch_ms, AccessPoint, Station, TopologyStore};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const JITTER_MAX_MS: u64 = 1000;
const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Subscription sent immediately after the upgrade completes.
const SUBSCRIBE_MSG: &str = r#"{"cmd":"events.stream","args":{"filter":"wifi.*"}}"#;

/// Bus connection parameters.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub username: String,
    pub password: String,
    pub auto_reconnect: bool,
    /// 0 means retry forever.
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8081,
            path: "/api/events".to_owned(),
            username: "user".to_owned(),
            password: "pass".to_owned(),
            auto_reconnect: true,
            max_reconnect_attempts: 0,
            reconnect_delay_ms: 1000,
            heartbeat_interval_ms: 15_000,
        }
    }
}

/// Connection lifecycle states. Transitions are logged on change only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Handshake,
    Connected,
    Reconnecting,
    Closing,
}

/// Anything that can carry an engine command. The coordinator and the
/// recovery controller hold a sink instead of the full client, breaking
/// the client -> coordinator -> client cycle.
#[allow(async_fn_in_trait)]
pub trait CommandSink: Send + Sync {
    async fn send_command(&self, cmd: &str) -> anyhow::Result<()>;
}

/// Cloneable handle for issuing engine commands over the keep-alive REST
/// socket.
#[derive(Clone)]
pub struct CommandSender {
    http: Arc<Mutex<KeepAliveHttp>>,
}

impl CommandSender {
    pub fn new(http: Arc<Mutex<KeepAliveHttp>>) -> Self {
        Self { http }
    }
}

impl CommandSink for CommandSender {
    /// POST `{"cmd": ...}` to `/api/session`. A response without
    /// `"success":true` drops the keep-alive socket and retries once.
    async fn send_command(&self, cmd: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({ "cmd": cmd }).to_string();
        let mut http = self.http.lock().await;

        let resp = http.post_json("/api/session", &body).await?;
        if resp.body.contains("\"success\":true") {
            return Ok(());
        }
        tracing::debug!(%cmd, status = resp.status, "command rejected, retrying on fresh socket");
        http.close();
        let resp = http.post_json("/api/session", &body).await?;
        if resp.body.contains("\"success\":true") {
            return Ok(());
        }
        bail!("command {cmd:?} rejected (status {})", resp.status)
    }
}

/// Spawn the receive worker. Runs until cancelled or, with auto-reconnect
/// off, until the first connection failure.
pub fn spawn_bus_client(
    config: BusConfig,
    store: Arc<TopologyStore>,
    events_tx: mpsc::UnboundedSender<BusEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_client(config, store, events_tx, cancel))
}

async fn run_client(
    config: BusConfig,
    store: Arc<TopologyStore>,
    events_tx: mpsc::UnboundedSender<BusEvent>,
    cancel: CancellationToken,
) {
    let mut state = ConnState::Disconnected;
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            set_state(&mut state, ConnState::Closing);
            break;
        }

        set_state(&mut state, ConnState::Connecting);
        match connect_and_upgrade(&config, &mut state).await {
            Ok((stream, leftover)) => {
                set_state(&mut state, ConnState::Connected);
                let mut frames: u64 = 0;
                let why =
                    run_session(&config, stream, leftover, &store, &events_tx, &cancel, &mut frames)
                        .await;
                // A session that never carried a frame was not a real
                // success; keep the backoff growing so a server that
                // drops us right after the upgrade is not hammered.
                if frames > 0 {
                    attempt = 0;
                }
                if cancel.is_cancelled() {
                    set_state(&mut state, ConnState::Closing);
                    break;
                }
                match why {
                    Ok(()) => tracing::info!("bus session closed by server"),
                    Err(e) => tracing::warn!(err = %e, frames, "bus session ended"),
                }
            }
            Err(e) => {
                tracing::warn!(err = %e, attempt, "bus connect failed");
            }
        }

        if !config.auto_reconnect {
            set_state(&mut state, ConnState::Disconnected);
            return;
        }
        if config.max_reconnect_attempts != 0 && attempt >= config.max_reconnect_attempts {
            tracing::error!(attempt, "giving up after max reconnect attempts");
            set_state(&mut state, ConnState::Disconnected);
            return;
        }

        set_state(&mut state, ConnState::Reconnecting);
        let delay = backoff_delay(attempt, config.reconnect_delay_ms)
            + Duration::from_millis(rand::rng().random_range(0..JITTER_MAX_MS));
        attempt = attempt.saturating_add(1);
        tokio::select! {
            _ = cancel.cancelled() => {
                set_state(&mut state, ConnState::Closing);
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Exponential backoff before jitter: `base * 2^attempt`, capped at 30 s.
fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

fn set_state(current: &mut ConnState, next: ConnState) {
    if *current != next {
        tracing::info!(prev = ?*current, next = ?next, "bus state");
        *current = next;
    }
}

/// Resolve, connect, upgrade. Returns the stream plus any bytes the server
/// sent after the upgrade response (early frames must not be lost).
async fn connect_and_upgrade(
    config: &BusConfig,
    state: &mut ConnState,
) -> anyhow::Result<(TcpStream, Vec<u8>)> {
    let addr = tokio::net::lookup_host((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("resolve {}", config.host))?
        .next()
        .with_context(|| format!("no address for {}", config.host))?;

    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
        .await
        .with_context(|| format!("connect to {addr} timed out"))??;
    stream.set_nodelay(true)?;

    set_state(state, ConnState::Handshake);
    let mut stream = stream;
    let mut key_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut key_bytes);
    let key = base64::engine::general_purpose::STANDARD.encode(key_bytes);
    let auth = base64::engine::general_purpose::STANDARD
        .encode(format!("{}:{}", config.username, config.password));

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Authorization: Basic {auth}\r\n\
         \r\n",
        path = config.path,
        host = config.host,
        port = config.port,
    );
    stream.write_all(request.as_bytes()).await?;

    // Read the upgrade response; frames may already trail the blank line.
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let mut chunk = [0u8; 1024];
        let n = tokio::time::timeout(CONNECT_TIMEOUT, stream.read(&mut chunk))
            .await
            .context("upgrade response timed out")??;
        if n == 0 {
            bail!("connection closed during upgrade");
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]);
    // The accept key is deliberately not verified: the bus is loopback-only
    // and the engine's handshake is trusted. A 101 is the whole contract.
    if !head.contains("101") {
        bail!("upgrade refused: {}", head.lines().next().unwrap_or(""));
    }

    let leftover = buf.split_off(head_end + 4);
    Ok((stream, leftover))
}

/// One connected session: subscribe, then multiplex socket reads against
/// the heartbeat timer until the peer closes or the heartbeat starves.
async fn run_session(
    config: &BusConfig,
    mut stream: TcpStream,
    leftover: Vec<u8>,
    store: &TopologyStore,
    events_tx: &mpsc::UnboundedSender<BusEvent>,
    cancel: &CancellationToken,
    frames: &mut u64,
) -> anyhow::Result<()> {
    stream.write_all(&encode_masked(Opcode::Text, SUBSCRIBE_MSG.as_bytes())).await?;

    let mut buf = leftover;
    let mut heartbeat = tokio::time::interval(Duration::from_millis(config.heartbeat_interval_ms));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    heartbeat.reset(); // the first tick should not fire immediately
    let mut ping_sent_at: Option<Instant> = None;

    loop {
        // Drain every complete frame already buffered.
        while let Some((frame, used)) = decode_frame(&buf)? {
            buf.drain(..used);
            *frames += 1;
            match frame.opcode {
                Opcode::Text => {
                    let text = String::from_utf8_lossy(&frame.payload);
                    dispatch_event(&text, store, events_tx).await;
                }
                Opcode::Ping => {
                    stream.write_all(&encode_masked(Opcode::Pong, &frame.payload)).await?;
                }
                Opcode::Pong => {
                    ping_sent_at = None;
                }
                Opcode::Close => return Ok(()),
                Opcode::Binary => {}
            }
        }

        let mut chunk = [0u8; 4096];
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            n = stream.read(&mut chunk) => {
                let n = n?;
                if n == 0 {
                    bail!("server closed the socket");
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            _ = heartbeat.tick() => {
                if let Some(sent) = ping_sent_at {
                    if sent.elapsed() > PONG_TIMEOUT {
                        bail!("no pong within {PONG_TIMEOUT:?}");
                    }
                }
                stream.write_all(&encode_masked(Opcode::Ping, b"")).await?;
                if ping_sent_at.is_none() {
                    ping_sent_at = Some(Instant::now());
                }
            }
        }
    }
}

/// Apply one event to the store, then forward it to the coordinator.
async fn dispatch_event(
    text: &str,
    store: &TopologyStore,
    events_tx: &mpsc::UnboundedSender<BusEvent>,
) {
    let Some(event) = parse_event(text) else {
        tracing::debug!(frame = %text, "dropping malformed event");
        return;
    };
    let now = epoch_ms();

    match &event {
        BusEvent::ApNew(ap) => {
            store.insert_or_update_ap(ap.to_access_point(now)).await;
        }
        BusEvent::ApLost(lost) => {
            store.remove_ap(lost.mac).await;
        }
        BusEvent::ClientNew(sta) | BusEvent::ClientProbe(sta) => {
            store.insert_or_update_sta(sta.to_station(now)).await;
        }
        BusEvent::ClientLost(lost) => {
            store.remove_sta(lost.mac).await;
        }
        BusEvent::Handshake(_) => {
            store.increment_handshakes().await;
        }
        BusEvent::Deauthentication(_) => {}
        BusEvent::Unknown => {
            tracing::trace!("ignoring non-wifi event");
            return;
        }
    }

    let _ = events_tx.send(event);
}

// -- REST reconciliation ------------------------------------------------------

/// Spawn the 60 s REST reconciliation task: the event-driven topology is
/// replaced wholesale with the engine's authoritative snapshot, absorbing
/// missed events and refreshing RSSI.
pub fn spawn_reconciliation(
    http: Arc<Mutex<KeepAliveHttp>>,
    store: Arc<TopologyStore>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let body = {
                let mut http = http.lock().await;
                match http.get("/api/session/wifi").await {
                    Ok(resp) if resp.is_ok() => resp.body,
                    Ok(resp) => {
                        tracing::debug!(status = resp.status, "wifi snapshot rejected");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(err = %e, "wifi snapshot failed");
                        continue;
                    }
                }
            };

            match parse_wifi_snapshot(&body) {
                Some((aps, stations)) => {
                    let (n_aps, n_stas) = (aps.len(), stations.len());
                    store.clear_and_bulk_replace(aps, stations).await;
                    tracing::debug!(aps = n_aps, stations = n_stas, "topology reconciled");
                }
                None => tracing::debug!("wifi snapshot unparseable"),
            }
        }
    })
}

/// Parse `GET /api/session/wifi`: an `aps` array with nested `clients`.
fn parse_wifi_snapshot(body: &str) -> Option<(Vec<AccessPoint>, Vec<Station>)> {
    #[derive(serde::Deserialize)]
    struct Snapshot {
        aps: Vec<crate::bus::events::ApData>,
    }

    let snapshot: Snapshot = serde_json::from_str(body).ok()?;
    let now = epoch_ms();
    let mut aps = Vec::with_capacity(snapshot.aps.len());
    let mut stations = Vec::new();
    for ap in &snapshot.aps {
        aps.push(ap.to_access_point(now));
        for client in &ap.clients {
            let mut sta = client.to_station(now);
            sta.ap_bssid = ap.mac;
            sta.associated = true;
            stations.push(sta);
        }
    }
    Some((aps, stations))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
