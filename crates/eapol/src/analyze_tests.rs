// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::key::{KEY_INFO_ACK, KEY_INFO_INSTALL, KEY_INFO_MIC, KEY_INFO_SECURE};

const M1_INFO: u16 = KEY_INFO_ACK;
const M2_INFO: u16 = KEY_INFO_MIC;
const M3_INFO: u16 = KEY_INFO_ACK | KEY_INFO_MIC | KEY_INFO_INSTALL;
const M4_INFO: u16 = KEY_INFO_MIC | KEY_INFO_SECURE;

/// Build a capture: Ethernet link type, one record per message.
/// Each message is (key_info, replay, nonce, mic byte, key_data, ts_micros).
fn capture(messages: &[(u16, u64, [u8; 32], u8, &[u8], u64)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend(0xA1B2C3D4u32.to_le_bytes());
    data.extend(2u16.to_le_bytes());
    data.extend(4u16.to_le_bytes());
    data.extend([0u8; 8]); // thiszone, sigfigs
    data.extend(65535u32.to_le_bytes());
    data.extend(1u32.to_le_bytes()); // DLT_EN10MB

    for &(key_info, replay, nonce, mic, key_data, ts) in messages {
        let mut frame = vec![0u8; 12];
        frame.extend([0x88, 0x8E]);
        frame.extend([0x02, 0x03]);
        frame.extend(((95 + key_data.len()) as u16).to_be_bytes());
        frame.push(2);
        frame.extend(key_info.to_be_bytes());
        frame.extend(16u16.to_be_bytes());
        frame.extend(replay.to_be_bytes());
        frame.extend(nonce);
        frame.extend([0u8; 16]);
        frame.extend([0u8; 8]);
        frame.extend([0u8; 8]);
        frame.extend([mic; 16]);
        frame.extend((key_data.len() as u16).to_be_bytes());
        frame.extend_from_slice(key_data);

        data.extend(((ts / 1_000_000) as u32).to_le_bytes());
        data.extend(((ts % 1_000_000) as u32).to_le_bytes());
        data.extend((frame.len() as u32).to_le_bytes());
        data.extend((frame.len() as u32).to_le_bytes());
        data.extend(frame);
    }
    data
}

fn pmkid_kde(pmkid: [u8; 16]) -> Vec<u8> {
    let mut kde = vec![0xDD, 0x14, 0x00, 0x0F, 0xAC, 0x04];
    kde.extend(pmkid);
    kde
}

// -- Full exchange ------------------------------------------------------------

#[test]
fn full_handshake_with_nonce_correction() {
    let mut m3_nonce = [0x11; 32];
    m3_nonce[28..].copy_from_slice(&[0x33; 4]);
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 1_000_000),
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 1_050_000),
        (M3_INFO, 3, m3_nonce, 0xCD, &[], 1_100_000),
        (M4_INFO, 4, [0; 32], 0xEF, &[], 1_150_000),
    ]);

    let info = analyze_bytes(&data).unwrap();
    assert_eq!(info.verdict(), Verdict::Crackable);
    assert!(info.is_full);
    assert!(info.nonce_valid);
    assert!(info.nonce_correction);
    assert!(info.replay_valid);
    assert!(info.temporal_valid);
    assert!(info.validated);
    assert!(info.m1_m2_locked);
    assert!(info.m3_locked);
}

#[test]
fn exact_nonce_match_sets_no_correction() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 1, [0x22; 32], 0xAB, &[], 10_000),
        (M3_INFO, 2, [0x11; 32], 0xCD, &[], 20_000),
        (M4_INFO, 2, [0; 32], 0xEF, &[], 30_000),
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.nonce_valid);
    assert!(!info.nonce_correction);
    assert!(info.is_full);
}

// -- PMKID --------------------------------------------------------------------

#[test]
fn pmkid_only_capture_is_crackable() {
    let kde = pmkid_kde([0x5A; 16]);
    let data = capture(&[(M1_INFO, 1, [0x11; 32], 0, &kde, 0)]);

    let info = analyze_bytes(&data).unwrap();
    assert_eq!(info.verdict(), Verdict::Crackable);
    assert!(info.has_pmkid);
    assert!(info.is_crackable);
    assert!(!info.is_full);
    assert_eq!(info.pmkid, Some([0x5A; 16]));
}

#[test]
fn pmkid_overrides_replay_downgrade() {
    let kde = pmkid_kde([0x5A; 16]);
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &kde, 0),
        (M2_INFO, 100, [0x22; 32], 0xAB, &[], 10_000), // far outside the window
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(!info.replay_valid);
    assert_eq!(info.verdict(), Verdict::Crackable);
}

// -- Replay windows -----------------------------------------------------------

#[test]
fn m2_at_window_edge_validates() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 4, [0x22; 32], 0xAB, &[], 10_000), // exactly rc+3
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.m1_m2_locked);
    assert!(info.replay_valid);
    assert!(info.validated);
    assert_eq!(info.verdict(), Verdict::Crackable);
}

#[test]
fn m2_past_window_downgrades_to_nothing() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 5, [0x22; 32], 0xAB, &[], 10_000), // rc+4
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(!info.m1_m2_locked);
    assert!(!info.replay_valid);
    assert!(!info.is_crackable);
    assert_eq!(info.verdict(), Verdict::None);
}

// -- Rolling match ------------------------------------------------------------

#[test]
fn later_matching_pair_wins_over_stale_m1() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 100, [0x22; 32], 0xAB, &[], 10_000), // mismatch, kept as fallback
        (M1_INFO, 200, [0x44; 32], 0, &[], 20_000),
        (M2_INFO, 201, [0x55; 32], 0xAB, &[], 30_000), // matches the second M1
    ]);

    let info = analyze_bytes(&data).unwrap();
    assert!(info.m1_m2_locked);
    assert_eq!(info.m1.unwrap().replay_counter, 200);
    assert_eq!(info.m2.unwrap().replay_counter, 201);
    assert!(info.replay_valid);
    assert_eq!(info.verdict(), Verdict::Crackable);
}

#[test]
fn locked_m1_is_not_replaced() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 10_000),
        (M1_INFO, 50, [0x99; 32], 0, &[], 20_000), // late rediscovery, ignored
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert_eq!(info.m1.unwrap().replay_counter, 1);
}

#[test]
fn m3_requires_anonce_prefix_match_when_locked() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 10_000),
        (M3_INFO, 3, [0x77; 32], 0xCD, &[], 20_000), // foreign ANonce
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.m1_m2_locked);
    assert!(!info.m3_locked);
    assert!(info.m3.is_none());
}

#[test]
fn m4_outside_m3_window_is_dropped() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 10_000),
        (M3_INFO, 3, [0x11; 32], 0xCD, &[], 20_000),
        (M4_INFO, 50, [0; 32], 0xEF, &[], 30_000),
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.m3_locked);
    assert!(info.m4.is_none());
    assert!(!info.is_full);
}

// -- Partial captures ---------------------------------------------------------

#[test]
fn m1_m3_nonce_correction_without_m2() {
    let mut m3_nonce = [0x11; 32];
    m3_nonce[28..].copy_from_slice(&[0x33; 4]);
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M3_INFO, 3, m3_nonce, 0xCD, &[], 20_000),
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.nonce_valid);
    assert!(info.nonce_correction);
    // M1+M3 alone cannot be cracked.
    assert_eq!(info.verdict(), Verdict::Partial);
}

#[test]
fn m2_m3_pair_is_crackable() {
    let data = capture(&[
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 0),
        (M3_INFO, 3, [0x11; 32], 0xCD, &[], 10_000),
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.is_crackable);
    assert_eq!(info.verdict(), Verdict::Crackable);
}

#[test]
fn lone_m2_is_partial() {
    let data = capture(&[(M2_INFO, 2, [0x22; 32], 0xAB, &[], 0)]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.saw_eapol);
    assert!(!info.is_crackable);
    assert_eq!(info.verdict(), Verdict::Partial);
}

#[test]
fn empty_capture_has_no_verdict() {
    let data = capture(&[]);
    let info = analyze_bytes(&data).unwrap();
    assert!(!info.saw_eapol);
    assert_eq!(info.verdict(), Verdict::None);
}

// -- Message hygiene ----------------------------------------------------------

#[test]
fn m1_with_nonzero_mic_is_not_stored() {
    let data = capture(&[(M1_INFO, 1, [0x11; 32], 0xFF, &[], 0)]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.m1.is_none());
    assert!(info.saw_eapol);
}

#[test]
fn m2_with_zero_snonce_is_not_stored() {
    let data = capture(&[(M2_INFO, 2, [0; 32], 0xAB, &[], 0)]);
    let info = analyze_bytes(&data).unwrap();
    assert!(info.m2.is_none());
}

// -- Temporal window ----------------------------------------------------------

#[test]
fn slow_exchange_fails_temporal_only() {
    let data = capture(&[
        (M1_INFO, 1, [0x11; 32], 0, &[], 0),
        (M2_INFO, 2, [0x22; 32], 0xAB, &[], 2_000_000), // two seconds later
    ]);
    let info = analyze_bytes(&data).unwrap();
    assert!(!info.temporal_valid);
    // Temporal is informational: crackability unaffected.
    assert!(info.is_crackable);
    assert!(info.validated);
}
