// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! EAPOL-Key frame extraction and 4-way message classification.
//!
//! The key descriptor layout is fixed (802.11i): descriptor type, key_info,
//! key_length, replay counter, nonce, key IV, RSC, key ID, MIC, key_data.
//! All multi-byte fields are big-endian regardless of the capture file's
//! byte order.

use crate::pcap::LinkType;

/// key_info bits used for message classification.
pub const KEY_INFO_INSTALL: u16 = 0x0040;
pub const KEY_INFO_ACK: u16 = 0x0080;
pub const KEY_INFO_MIC: u16 = 0x0100;
pub const KEY_INFO_SECURE: u16 = 0x0200;

/// EAPOL packet type carrying the key descriptor.
const EAPOL_TYPE_KEY: u8 = 3;

/// 802.1X header (4) + fixed key descriptor (95).
const MIN_KEY_FRAME_LEN: usize = 99;

/// The four messages of the WPA 4-way exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    M1,
    M2,
    M3,
    M4,
}

impl Message {
    /// Classify from key_info bits. M4 must be tested before M2: both clear
    /// ACK and set MIC, and only the Secure bit tells them apart.
    pub fn classify(key_info: u16) -> Option<Self> {
        let ack = key_info & KEY_INFO_ACK != 0;
        let mic = key_info & KEY_INFO_MIC != 0;
        let install = key_info & KEY_INFO_INSTALL != 0;
        let secure = key_info & KEY_INFO_SECURE != 0;

        if ack && !mic {
            Some(Self::M1)
        } else if ack && mic && install {
            Some(Self::M3)
        } else if !ack && mic && secure {
            Some(Self::M4)
        } else if !ack && mic {
            Some(Self::M2)
        } else {
            None
        }
    }
}

/// A parsed EAPOL-Key frame.
#[derive(Debug, Clone)]
pub struct EapolKey<'a> {
    pub key_info: u16,
    pub replay_counter: u64,
    pub nonce: [u8; 32],
    pub mic: [u8; 16],
    pub key_data: &'a [u8],
}

impl<'a> EapolKey<'a> {
    /// Parse an 802.1X frame; `None` unless it is a well-formed EAPOL-Key.
    pub fn parse(data: &'a [u8]) -> Option<Self> {
        if data.len() < MIN_KEY_FRAME_LEN || data[1] != EAPOL_TYPE_KEY {
            return None;
        }
        // Descriptor fields, offset from the start of the 802.1X frame:
        // 4 type, 5 key_info, 7 key_length, 9 replay, 17 nonce, 49 IV,
        // 65 RSC, 73 key ID, 81 MIC, 97 key_data_length, 99 key_data.
        let key_info = u16::from_be_bytes([data[5], data[6]]);
        let replay_counter = u64::from_be_bytes([
            data[9], data[10], data[11], data[12], data[13], data[14], data[15], data[16],
        ]);
        let mut nonce = [0u8; 32];
        nonce.copy_from_slice(&data[17..49]);
        let mut mic = [0u8; 16];
        mic.copy_from_slice(&data[81..97]);
        let key_data_len = u16::from_be_bytes([data[97], data[98]]) as usize;
        let key_data = if data.len() >= MIN_KEY_FRAME_LEN + key_data_len {
            &data[99..99 + key_data_len]
        } else {
            &[]
        };
        Some(Self { key_info, replay_counter, nonce, mic, key_data })
    }

    pub fn has_mic(&self) -> bool {
        self.mic.iter().any(|&b| b != 0)
    }

    pub fn has_nonce(&self) -> bool {
        self.nonce.iter().any(|&b| b != 0)
    }
}

/// Scan M1 key_data TLVs for a PMKID KDE: tag 0xDD, length >= 20, OUI+type
/// `00 0F AC 04`, followed by a non-zero 16-byte PMKID.
pub fn find_pmkid(key_data: &[u8]) -> Option<[u8; 16]> {
    let mut i = 0usize;
    while i + 2 <= key_data.len() {
        let tag = key_data[i];
        let len = key_data[i + 1] as usize;
        let body = key_data.get(i + 2..i + 2 + len)?;
        if tag == 0xDD && len >= 20 && body[..4] == [0x00, 0x0F, 0xAC, 0x04] {
            let pmkid = &body[4..20];
            if pmkid.iter().any(|&b| b != 0) {
                let mut out = [0u8; 16];
                out.copy_from_slice(pmkid);
                return Some(out);
            }
        }
        i += 2 + len;
    }
    None
}

/// Locate the 802.1X frame within a captured link-layer payload.
///
/// Radiotap frames skip the declared header length (little-endian in the
/// file, independent of the pcap byte order) before 802.11 parsing. 802.11
/// data frames carry a variable header: 24 bytes base, +2 for QoS-data
/// subtypes, +6 when both ToDS and FromDS are set, then an LLC/SNAP header
/// selecting EtherType 0x888E. Ethernet checks the EtherType directly.
pub fn extract_eapol<'a>(link: LinkType, payload: &'a [u8]) -> Option<&'a [u8]> {
    match link {
        LinkType::Ethernet => {
            if payload.len() < 14 || payload[12] != 0x88 || payload[13] != 0x8E {
                return None;
            }
            Some(&payload[14..])
        }
        LinkType::Ieee80211 => extract_from_dot11(payload),
        LinkType::Radiotap => {
            if payload.len() < 4 {
                return None;
            }
            let rt_len = u16::from_le_bytes([payload[2], payload[3]]) as usize;
            extract_from_dot11(payload.get(rt_len..)?)
        }
    }
}

fn extract_from_dot11(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 2 {
        return None;
    }
    let fc = frame[0];
    let flags = frame[1];
    // Only data frames (type 2) can carry LLC payloads.
    if (fc >> 2) & 0x03 != 2 {
        return None;
    }
    let subtype = (fc >> 4) & 0x0F;
    let mut hdr = 24usize;
    if subtype >= 8 {
        hdr += 2; // QoS control
    }
    if flags & 0x03 == 0x03 {
        hdr += 6; // addr4, WDS frames
    }
    let llc = frame.get(hdr..hdr + 8)?;
    // LLC SNAP: AA AA 03, zero OUI, EtherType 0x888E.
    if llc[..3] != [0xAA, 0xAA, 0x03] || llc[3..6] != [0, 0, 0] || llc[6..8] != [0x88, 0x8E] {
        return None;
    }
    frame.get(hdr + 8..)
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
