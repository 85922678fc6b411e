// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WPA 4-way handshake analysis for on-disk pcap captures.
//!
//! Walks a libpcap file (both byte orders, Ethernet / raw 802.11 / radiotap
//! link types), extracts EAPOL-Key frames, classifies the M1–M4 exchange
//! messages, performs rolling-match selection across interleaved exchanges,
//! and maps the result into a three-valued crackability verdict.

pub mod analyze;
pub mod key;
pub mod pcap;

pub use analyze::{analyze_bytes, analyze_file, HandshakeInfo, MessageSlot, Verdict};
pub use key::{EapolKey, Message};
pub use pcap::{LinkType, PcapError, PcapReader, Record};
