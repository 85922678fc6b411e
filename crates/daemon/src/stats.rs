// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capture-directory scanner and counter derivation.
//!
//! Walks the captures directory on a timer (and on demand after a fresh
//! handshake), feeding unseen or modified pcap files to the analyzer.
//! Verdicts are cached by mtime so an unchanged file never costs a second
//! parse. Also syncs the wpa-sec potfile into per-SSID key files and
//! derives the four user-facing counters.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use eapol::Verdict;
use indexmap::IndexMap;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::mac::Mac;
use crate::ui::Ui;

const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Verdict cache capacity; oldest insertion is evicted first.
const CACHE_CAP: usize = 64;

/// BSSIDs with a crackable capture on disk, shared with the attack
/// coordinator's already-captured check.
pub type CapturedSet = Arc<RwLock<HashSet<Mac>>>;

/// Most recent GPS fix found next to a capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// One scan's results.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Cracked passwords (key files).
    pub pwds: u32,
    /// Full (crackable) handshakes.
    pub fhs: u32,
    /// Partial handshakes, including orphan `.22000` hash files.
    pub phs: u32,
    /// Total capture files.
    pub tcaps: u32,
    pub captured: HashSet<Mac>,
    pub gps: Option<GpsFix>,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    mtime: SystemTime,
    verdict: Verdict,
}

/// Bounded FIFO verdict cache keyed by file name.
struct PcapCache {
    map: IndexMap<String, CacheEntry>,
}

impl PcapCache {
    fn new() -> Self {
        Self { map: IndexMap::with_capacity(CACHE_CAP) }
    }

    fn lookup(&self, name: &str, mtime: SystemTime) -> Option<Verdict> {
        let entry = self.map.get(name)?;
        (entry.mtime == mtime).then_some(entry.verdict)
    }

    fn insert(&mut self, name: &str, mtime: SystemTime, verdict: Verdict) {
        if let Some(entry) = self.map.get_mut(name) {
            *entry = CacheEntry { mtime, verdict };
            return;
        }
        while self.map.len() >= CACHE_CAP {
            self.map.shift_remove_index(0);
        }
        self.map.insert(name.to_owned(), CacheEntry { mtime, verdict });
    }
}

/// Directory scanner with verdict cache and potfile tracking.
pub struct StatsScanner {
    captures_dir: PathBuf,
    cracked_dir: PathBuf,
    potfile: PathBuf,
    cache: PcapCache,
    potfile_mtime: Option<SystemTime>,
}

impl StatsScanner {
    pub fn new(captures_dir: PathBuf, cracked_dir: PathBuf, potfile: PathBuf) -> Self {
        Self { captures_dir, cracked_dir, potfile, cache: PcapCache::new(), potfile_mtime: None }
    }

    /// Scan everything and derive the counters.
    pub async fn scan(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let mut pcap_stems: HashSet<String> = HashSet::new();
        let mut hash_stems: Vec<String> = Vec::new();
        let mut newest_gps: Option<(SystemTime, PathBuf)> = None;

        let entries = match std::fs::read_dir(&self.captures_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %self.captures_dir.display(), err = %e, "captures dir unreadable");
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(".pcap") {
                pcap_stems.insert(stem.to_owned());
                report.tcaps += 1;
                let verdict = self.verdict_for(&path, &name).await;
                match verdict {
                    Verdict::Crackable => {
                        report.fhs += 1;
                        if let Some(bssid) = bssid_from_capture_stem(stem) {
                            report.captured.insert(bssid);
                        }
                    }
                    Verdict::Partial => report.phs += 1,
                    Verdict::None => {}
                }
            } else if let Some(stem) = name.strip_suffix(".22000") {
                hash_stems.push(stem.to_owned());
            } else if name.ends_with(".gps.json") {
                if let Ok(mtime) = entry.metadata().and_then(|m| m.modified()) {
                    if newest_gps.as_ref().map(|(t, _)| mtime > *t).unwrap_or(true) {
                        newest_gps = Some((mtime, path));
                    }
                }
            }
        }

        // A hash file with no surviving pcap still marks a partial capture.
        for stem in &hash_stems {
            if !pcap_stems.contains(stem) {
                report.phs += 1;
            }
        }

        if let Some((_, path)) = newest_gps {
            report.gps = read_gps(&path);
        }

        self.sync_potfile();
        report.pwds = count_key_files(&self.cracked_dir);
        report
    }

    /// Cached verdict, or a fresh analyzer run when the mtime moved.
    async fn verdict_for(&mut self, path: &Path, name: &str) -> Verdict {
        let mtime = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return Verdict::None,
        };
        if let Some(verdict) = self.cache.lookup(name, mtime) {
            return verdict;
        }

        let owned = path.to_owned();
        let verdict = match tokio::task::spawn_blocking(move || eapol::analyze_file(&owned)).await
        {
            Ok(Ok(info)) => info.verdict(),
            Ok(Err(e)) => {
                tracing::debug!(file = %path.display(), err = %e, "capture unparseable");
                Verdict::None
            }
            Err(e) => {
                tracing::warn!(err = %e, "analyzer task failed");
                Verdict::None
            }
        };
        self.cache.insert(name, mtime, verdict);
        verdict
    }

    /// Write `<SSID>.key` files for potfile entries that have none yet.
    /// Re-reads the potfile only when its mtime moves.
    fn sync_potfile(&mut self) {
        let mtime = match std::fs::metadata(&self.potfile).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return,
        };
        if self.potfile_mtime == Some(mtime) {
            return;
        }
        self.potfile_mtime = Some(mtime);

        let contents = match std::fs::read_to_string(&self.potfile) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::debug!(err = %e, "potfile unreadable");
                return;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.cracked_dir) {
            tracing::warn!(err = %e, "cracked dir not creatable");
            return;
        }

        for line in contents.lines() {
            let mut parts = line.splitn(3, ':');
            let (Some(_mac), Some(ssid), Some(password)) =
                (parts.next(), parts.next(), parts.next())
            else {
                continue;
            };
            if ssid.is_empty() || password.is_empty() {
                continue;
            }
            let key_path = self.cracked_dir.join(format!("{ssid}.key"));
            if key_path.exists() {
                continue;
            }
            if let Err(e) = std::fs::write(&key_path, password) {
                tracing::warn!(file = %key_path.display(), err = %e, "key file write failed");
            } else {
                tracing::info!(%ssid, "new cracked password from potfile");
            }
        }
    }
}

/// Captures are named `<SSID>_<BSSIDhex>.pcap`; recover the BSSID.
fn bssid_from_capture_stem(stem: &str) -> Option<Mac> {
    let hex = stem.rsplit('_').next()?;
    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let mut bytes = [0u8; 6];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(Mac(bytes))
}

fn read_gps(path: &Path) -> Option<GpsFix> {
    #[derive(serde::Deserialize)]
    struct Sidecar {
        #[serde(rename = "Latitude")]
        latitude: f64,
        #[serde(rename = "Longitude")]
        longitude: f64,
    }
    let contents = std::fs::read_to_string(path).ok()?;
    let sidecar: Sidecar = serde_json::from_str(&contents).ok()?;
    Some(GpsFix { latitude: sidecar.latitude, longitude: sidecar.longitude })
}

fn count_key_files(dir: &Path) -> u32 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter(|e| {
            e.path().extension().and_then(|x| x.to_str()).map(|x| x == "key").unwrap_or(false)
        })
        .count() as u32
}

/// Spawn the stats worker: scans every 60 s and whenever the coordinator
/// requests a rescan, then pushes counters and GPS into the UI.
pub fn spawn_stats_task(
    mut scanner: StatsScanner,
    ui: Arc<Ui>,
    captured: CapturedSet,
    mut rescan_rx: mpsc::UnboundedReceiver<()>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCAN_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
                request = rescan_rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                }
            }

            let report = scanner.scan().await;
            *captured.write().await = report.captured.clone();
            ui.update(|state| {
                state.set_counters(report.pwds, report.fhs, report.phs, report.tcaps);
                if let Some(fix) = report.gps {
                    let line = format!("{:.4},{:.4}", fix.latitude, fix.longitude);
                    if state.gps != line {
                        state.gps = line;
                        state.dirty = true;
                    }
                }
            })
            .await;
        }
    })
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
