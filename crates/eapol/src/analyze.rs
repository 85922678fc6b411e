// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolling-match handshake selection and verdict mapping.
//!
//! A capture may contain many interleaved 4-way exchanges. The analyzer
//! locks onto the first (M1, M2) pair whose replay counters agree, then the
//! first M3 whose ANonce matches the locked M1, then an M4 by replay
//! counter. Messages seen before a lock are kept as fallback candidates so
//! partial captures still produce a useful verdict.

use std::path::Path;

use crate::key::{extract_eapol, find_pmkid, EapolKey, Message};
use crate::pcap::{PcapError, PcapReader};

/// Replay counters of one exchange advance by at most this much between
/// messages; anything farther apart belongs to a different exchange.
const REPLAY_WINDOW: u64 = 3;

/// Adjacent messages of a live exchange arrive within this many microseconds.
const TEMPORAL_WINDOW_US: u64 = 250_000;

/// Crackability verdict for one capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing useful in the file.
    None,
    /// EAPOL-Key frames present but not enough to attempt a crack.
    Partial,
    /// A validated, crackable handshake or PMKID.
    Crackable,
}

impl Verdict {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Partial => 1,
            Self::Crackable => 2,
        }
    }
}

/// Nonce, replay counter and capture timestamp of one selected message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSlot {
    pub nonce: [u8; 32],
    pub replay_counter: u64,
    pub ts_micros: u64,
}

impl MessageSlot {
    fn from_key(key: &EapolKey<'_>, ts_micros: u64) -> Self {
        Self { nonce: key.nonce, replay_counter: key.replay_counter, ts_micros }
    }
}

/// Everything the analyzer learned about one capture.
#[derive(Debug, Clone, Default)]
pub struct HandshakeInfo {
    pub m1: Option<MessageSlot>,
    pub m2: Option<MessageSlot>,
    pub m3: Option<MessageSlot>,
    pub m4: Option<MessageSlot>,
    pub has_pmkid: bool,
    pub pmkid: Option<[u8; 16]>,

    /// An (M1, M2) pair agreed by replay counter was locked in.
    pub m1_m2_locked: bool,
    /// An M3 matching the locked M1's ANonce was locked in.
    pub m3_locked: bool,

    pub nonce_valid: bool,
    /// ANonce prefix matches but the last four bytes differ; a downstream
    /// cracker needs the nonce-correction flag to try adjacent values.
    pub nonce_correction: bool,
    pub replay_valid: bool,
    /// Adjacent messages within 250 ms. Quality signal only.
    pub temporal_valid: bool,
    pub validated: bool,

    pub is_crackable: bool,
    pub is_full: bool,

    /// At least one EAPOL-Key frame was seen, crackable or not.
    pub saw_eapol: bool,
    /// The only (M1, M2) pair on file straddles two exchanges; the capture
    /// is treated as empty rather than partial.
    pub mismatched_pair: bool,
}

impl HandshakeInfo {
    pub fn has_m1(&self) -> bool {
        self.m1.is_some()
    }
    pub fn has_m2(&self) -> bool {
        self.m2.is_some()
    }
    pub fn has_m3(&self) -> bool {
        self.m3.is_some()
    }
    pub fn has_m4(&self) -> bool {
        self.m4.is_some()
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_crackable {
            Verdict::Crackable
        } else if self.saw_eapol && !self.mismatched_pair {
            Verdict::Partial
        } else {
            Verdict::None
        }
    }

    fn observe(&mut self, key: &EapolKey<'_>, ts_micros: u64) {
        let Some(message) = Message::classify(key.key_info) else {
            return;
        };
        self.saw_eapol = true;

        match message {
            Message::M1 => {
                // PMKID rides in M1's key data; check even when locked so a
                // later PMKID still upgrades the verdict.
                if let Some(pmkid) = find_pmkid(key.key_data) {
                    self.has_pmkid = true;
                    self.pmkid = Some(pmkid);
                }
                // Rolling: each M1 replaces the previous until an M2 locks it.
                if !self.m1_m2_locked && !key.has_mic() && key.has_nonce() {
                    self.m1 = Some(MessageSlot::from_key(key, ts_micros));
                }
            }
            Message::M2 => {
                if self.m1_m2_locked || !key.has_mic() || !key.has_nonce() {
                    return;
                }
                if let Some(m1) = self.m1 {
                    if in_window(m1.replay_counter, key.replay_counter) {
                        self.m2 = Some(MessageSlot::from_key(key, ts_micros));
                        self.m1_m2_locked = true;
                        return;
                    }
                }
                // Fallback for partial captures; first one wins.
                if self.m2.is_none() {
                    self.m2 = Some(MessageSlot::from_key(key, ts_micros));
                }
            }
            Message::M3 => {
                if self.m3_locked || !key.has_mic() || !key.has_nonce() {
                    return;
                }
                if self.m1_m2_locked {
                    if let Some(m1) = self.m1 {
                        if m1.nonce[..28] == key.nonce[..28] {
                            self.m3 = Some(MessageSlot::from_key(key, ts_micros));
                            self.m3_locked = true;
                        }
                    }
                } else if self.m3.is_none() {
                    self.m3 = Some(MessageSlot::from_key(key, ts_micros));
                }
            }
            Message::M4 => {
                if self.m4.is_some() || !key.has_mic() {
                    return;
                }
                if self.m3_locked {
                    if let Some(m3) = self.m3 {
                        if in_window(m3.replay_counter, key.replay_counter) {
                            self.m4 = Some(MessageSlot::from_key(key, ts_micros));
                        }
                    }
                } else {
                    self.m4 = Some(MessageSlot::from_key(key, ts_micros));
                }
            }
        }
    }

    fn finalize(&mut self) {
        self.replay_valid = self.check_replay();
        (self.nonce_valid, self.nonce_correction) = self.check_nonce();
        self.temporal_valid = self.check_temporal();

        self.is_crackable = self.has_pmkid
            || (self.m1.is_some() && self.m2.is_some())
            || (self.m2.is_some() && self.m3.is_some());
        // An (M1, M2) pair that fails the replay window is two different
        // exchanges glued together; without a PMKID it cannot be cracked.
        if self.m1.is_some() && self.m2.is_some() && !self.replay_valid && !self.has_pmkid {
            self.is_crackable = false;
            self.mismatched_pair = true;
        }

        self.is_full = self.m1.is_some()
            && self.m2.is_some()
            && self.m3.is_some()
            && self.m4.is_some()
            && self.nonce_valid;

        self.validated = self.is_crackable && self.replay_valid && self.nonce_valid;
    }

    fn check_replay(&self) -> bool {
        if let (Some(m1), Some(m2)) = (self.m1, self.m2) {
            if !in_window(m1.replay_counter, m2.replay_counter) {
                return false;
            }
        }
        if let (Some(m2), Some(m3)) = (self.m2, self.m3) {
            if !in_window(m2.replay_counter, m3.replay_counter) {
                return false;
            }
        }
        if let Some(m4) = self.m4 {
            // Falls back to M2's counter when M3 never made it into the file.
            let anchor = self.m3.or(self.m2);
            if let Some(prev) = anchor {
                if !in_window(prev.replay_counter, m4.replay_counter) {
                    return false;
                }
            }
        }
        true
    }

    fn check_nonce(&self) -> (bool, bool) {
        let (Some(m1), Some(m3)) = (self.m1, self.m3) else {
            return (true, false);
        };
        if m1.nonce[..28] != m3.nonce[..28] {
            return (false, false);
        }
        (true, m1.nonce[28..] != m3.nonce[28..])
    }

    fn check_temporal(&self) -> bool {
        let chain = [self.m1, self.m2, self.m3, self.m4];
        chain.windows(2).all(|pair| match (pair[0], pair[1]) {
            (Some(a), Some(b)) => b.ts_micros.abs_diff(a.ts_micros) <= TEMPORAL_WINDOW_US,
            _ => true,
        })
    }
}

fn in_window(base: u64, candidate: u64) -> bool {
    candidate >= base && candidate <= base.saturating_add(REPLAY_WINDOW)
}

/// Analyze an in-memory capture file.
pub fn analyze_bytes(data: &[u8]) -> Result<HandshakeInfo, PcapError> {
    let mut reader = PcapReader::new(data)?;
    let link = reader.link_type();
    let mut info = HandshakeInfo::default();

    while let Some(record) = reader.next_record() {
        let Some(eapol) = extract_eapol(link, record.payload) else {
            continue;
        };
        if let Some(key) = EapolKey::parse(eapol) {
            info.observe(&key, record.ts_micros());
        }
    }

    info.finalize();
    Ok(info)
}

/// Analyze a capture file on disk.
pub fn analyze_file(path: &Path) -> Result<HandshakeInfo, PcapError> {
    let data = std::fs::read(path)?;
    analyze_bytes(&data)
}

#[cfg(test)]
#[path = "analyze_tests.rs"]
mod tests;
