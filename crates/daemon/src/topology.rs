// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory radio topology: the set of visible access points and stations.
//!
//! Mutated by the event-bus receive worker, read by the attack coordinator
//! and the recovery controller, and replaced wholesale by the periodic REST
//! reconciliation. All operations hold a single lock; readers get copies of
//! fixed-size value types, never references into the tables.

use indexmap::IndexMap;
use tokio::sync::Mutex;

use crate::mac::Mac;

/// Table caps. Inserts past the cap are dropped without logging; the
/// environment can easily exceed them in dense areas and the drops are
/// expected.
pub const AP_CAP: usize = 256;
pub const STA_CAP: usize = 512;

/// SSIDs longer than the 802.11 limit are truncated on insert.
const SSID_MAX: usize = 32;

/// Stations remember at most this many probed SSIDs.
const PROBE_MAX: usize = 5;

/// One visible access point. Identity is the BSSID.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessPoint {
    pub bssid: Mac,
    pub ssid: String,
    pub rssi: i8,
    pub channel: u8,
    pub encryption: String,
    pub vendor: String,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub clients: u16,
    pub pmkid_available: bool,
    pub handshake_captured: bool,
}

/// One observed station. Identity is the MAC; `ap_bssid` is zeroed when the
/// station is not associated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Station {
    pub mac: Mac,
    pub ap_bssid: Mac,
    pub vendor: String,
    pub rssi: i8,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub probes: Vec<String>,
    pub associated: bool,
}

#[derive(Default)]
struct Tables {
    aps: IndexMap<Mac, AccessPoint>,
    stations: IndexMap<Mac, Station>,
    handshakes: u64,
    last_sync_ms: u64,
    initial_sync_done: bool,
}

/// Thread-safe topology store with fixed caps.
#[derive(Default)]
pub struct TopologyStore {
    inner: Mutex<Tables>,
}

impl TopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an AP. New entries keep the provided `first_seen_ms`; updates
    /// preserve the original first-seen and refresh everything else.
    pub async fn insert_or_update_ap(&self, mut ap: AccessPoint) {
        ap.ssid.truncate(SSID_MAX);
        let mut t = self.inner.lock().await;
        if let Some(existing) = t.aps.get_mut(&ap.bssid) {
            ap.first_seen_ms = existing.first_seen_ms;
            ap.last_seen_ms = ap.last_seen_ms.max(existing.first_seen_ms);
            *existing = ap;
        } else if t.aps.len() < AP_CAP {
            ap.last_seen_ms = ap.last_seen_ms.max(ap.first_seen_ms);
            t.aps.insert(ap.bssid, ap);
        }
    }

    /// Remove an AP and every station associated with it.
    pub async fn remove_ap(&self, bssid: Mac) -> bool {
        let mut t = self.inner.lock().await;
        let removed = t.aps.shift_remove(&bssid).is_some();
        if removed {
            t.stations.retain(|_, sta| sta.ap_bssid != bssid);
        }
        removed
    }

    pub async fn insert_or_update_sta(&self, mut sta: Station) {
        sta.probes.truncate(PROBE_MAX);
        let mut t = self.inner.lock().await;
        if let Some(existing) = t.stations.get_mut(&sta.mac) {
            sta.first_seen_ms = existing.first_seen_ms;
            // Probes accumulate across sightings, oldest first.
            let mut probes = std::mem::take(&mut existing.probes);
            for probe in sta.probes.drain(..) {
                if !probes.iter().any(|p| p == &probe) && probes.len() < PROBE_MAX {
                    probes.push(probe);
                }
            }
            sta.probes = probes;
            *existing = sta;
        } else if t.stations.len() < STA_CAP {
            t.stations.insert(sta.mac, sta);
        }
    }

    pub async fn remove_sta(&self, mac: Mac) -> bool {
        self.inner.lock().await.stations.shift_remove(&mac).is_some()
    }

    pub async fn snapshot_ap_count(&self) -> usize {
        self.inner.lock().await.aps.len()
    }

    pub async fn snapshot_sta_count(&self) -> usize {
        self.inner.lock().await.stations.len()
    }

    pub async fn get_ap_by_index(&self, index: usize) -> Option<AccessPoint> {
        self.inner.lock().await.aps.get_index(index).map(|(_, ap)| ap.clone())
    }

    pub async fn find_ap_by_bssid(&self, bssid: Mac) -> Option<AccessPoint> {
        self.inner.lock().await.aps.get(&bssid).cloned()
    }

    pub async fn find_sta(&self, mac: Mac) -> Option<Station> {
        self.inner.lock().await.stations.get(&mac).cloned()
    }

    /// Replace both tables with a REST snapshot. The handshake counter and
    /// caps survive; readers never observe a half-replaced table.
    pub async fn clear_and_bulk_replace(&self, aps: Vec<AccessPoint>, stations: Vec<Station>) {
        let mut t = self.inner.lock().await;
        t.aps.clear();
        t.stations.clear();
        for mut ap in aps.into_iter().take(AP_CAP) {
            ap.ssid.truncate(SSID_MAX);
            t.aps.insert(ap.bssid, ap);
        }
        for mut sta in stations.into_iter().take(STA_CAP) {
            sta.probes.truncate(PROBE_MAX);
            t.stations.insert(sta.mac, sta);
        }
        t.last_sync_ms = epoch_ms();
        t.initial_sync_done = true;
    }

    pub async fn increment_handshakes(&self) -> u64 {
        let mut t = self.inner.lock().await;
        t.handshakes += 1;
        t.handshakes
    }

    pub async fn handshake_count(&self) -> u64 {
        self.inner.lock().await.handshakes
    }

    pub async fn last_sync_ms(&self) -> u64 {
        self.inner.lock().await.last_sync_ms
    }

    pub async fn initial_sync_done(&self) -> bool {
        self.inner.lock().await.initial_sync_done
    }
}

/// Current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
