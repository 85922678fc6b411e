// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed view of the capture engine's event stream.
//!
//! Events arrive as `{"tag":"wifi.ap.new","data":{...}}` envelopes. Tags
//! outside the wifi namespace (or added by newer engine versions) decode to
//! `Unknown` and are dropped by the dispatcher rather than killing the
//! receive loop.

use serde::Deserialize;

use crate::mac::Mac;
use crate::topology::{AccessPoint, Station};

/// One event envelope off the bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tag", content = "data")]
pub enum BusEvent {
    #[serde(rename = "wifi.ap.new")]
    ApNew(ApData),
    #[serde(rename = "wifi.ap.lost")]
    ApLost(ApRef),
    #[serde(rename = "wifi.client.new")]
    ClientNew(StationData),
    #[serde(rename = "wifi.client.probe")]
    ClientProbe(StationData),
    #[serde(rename = "wifi.client.lost")]
    ClientLost(StationRef),
    #[serde(rename = "wifi.client.handshake")]
    Handshake(HandshakeData),
    #[serde(rename = "wifi.deauthentication")]
    Deauthentication(DeauthData),
    #[serde(other)]
    Unknown,
}

/// AP payload for `wifi.ap.new`. The engine reports the network name in
/// `hostname`; some builds mirror it in `ssid`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApData {
    pub mac: Mac,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub channel: u16,
    #[serde(default)]
    pub encryption: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub clients: Vec<StationData>,
    #[serde(default)]
    pub handshake: bool,
}

impl ApData {
    /// Network name: `hostname` wins, `ssid` is the fallback.
    pub fn name(&self) -> &str {
        self.hostname.as_deref().or(self.ssid.as_deref()).unwrap_or("")
    }

    pub fn to_access_point(&self, now_ms: u64) -> AccessPoint {
        AccessPoint {
            bssid: self.mac,
            ssid: self.name().to_owned(),
            rssi: clamp_rssi(self.rssi),
            channel: self.channel.min(u16::from(u8::MAX)) as u8,
            encryption: self.encryption.clone(),
            vendor: self.vendor.clone(),
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            clients: self.clients.len() as u16,
            pmkid_available: false,
            handshake_captured: self.handshake,
        }
    }
}

/// Station payload for `wifi.client.*`. Probe events additionally carry the
/// SSID the station was looking for.
#[derive(Debug, Clone, Deserialize)]
pub struct StationData {
    pub mac: Mac,
    #[serde(default)]
    pub ap: Option<Mac>,
    #[serde(default)]
    pub rssi: i32,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub ssid: Option<String>,
}

impl StationData {
    pub fn to_station(&self, now_ms: u64) -> Station {
        Station {
            mac: self.mac,
            ap_bssid: self.ap.unwrap_or(Mac::ZERO),
            vendor: self.vendor.clone(),
            rssi: clamp_rssi(self.rssi),
            first_seen_ms: now_ms,
            last_seen_ms: now_ms,
            probes: self.ssid.iter().filter(|s| !s.is_empty()).cloned().collect(),
            associated: self.ap.map(|m| !m.is_zero()).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApRef {
    pub mac: Mac,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationRef {
    pub mac: Mac,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeData {
    pub ap: Mac,
    pub station: Mac,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub pmkid: bool,
    #[serde(default)]
    pub full: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeauthData {
    #[serde(default)]
    pub ap: Option<Mac>,
    #[serde(default)]
    pub station: Option<Mac>,
    #[serde(default)]
    pub rssi: i32,
}

/// Parse one text frame. `None` means the frame was not a well-formed
/// envelope; the caller drops it and keeps receiving.
pub fn parse_event(text: &str) -> Option<BusEvent> {
    serde_json::from_str(text).ok()
}

fn clamp_rssi(rssi: i32) -> i8 {
    rssi.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
