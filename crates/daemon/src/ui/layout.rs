// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget placement presets for the supported e-ink panel geometries.
//!
//! Each preset fixes the position of every widget; the renderer never
//! computes layout at draw time.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

const fn pt(x: usize, y: usize) -> Point {
    Point { x, y }
}

/// Fixed widget positions for one panel geometry.
#[derive(Debug, Clone)]
pub struct Layout {
    pub width: usize,
    pub height: usize,

    pub name: Point,
    pub channel: Point,
    pub aps: Point,
    pub uptime: Point,
    pub face: Point,
    pub friend: Point,
    pub status: Point,
    pub shakes: Point,
    pub mode: Point,
    pub bt: Point,
    pub gps: Point,
    pub battery: Point,
    pub memtemp: Point,
    pub counters: Point,

    /// Separator rules under the header and above the footer.
    pub header_rule_y: usize,
    pub footer_rule_y: usize,
}

/// Supported panels, named by diagonal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutPreset {
    /// 1.54" 200x200
    Panel154,
    /// 2.13" 250x122 (v2 timing, same geometry)
    Panel213,
    /// 2.13" 212x104 (v1 panels)
    Panel213V1,
    /// 2.7" 264x176
    Panel27,
    /// 2.9" 296x128
    Panel29,
    /// 4.2" 400x300
    Panel42,
}

impl LayoutPreset {
    pub fn layout(self) -> Layout {
        match self {
            Self::Panel154 => scaled_layout(200, 200),
            Self::Panel213 => scaled_layout(250, 122),
            Self::Panel213V1 => scaled_layout(212, 104),
            Self::Panel27 => scaled_layout(264, 176),
            Self::Panel29 => scaled_layout(296, 128),
            Self::Panel42 => scaled_layout(400, 300),
        }
    }
}

impl FromStr for LayoutPreset {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1in54" | "154" => Ok(Self::Panel154),
            "2in13" | "213" | "2in13v2" => Ok(Self::Panel213),
            "2in13v1" | "213v1" => Ok(Self::Panel213V1),
            "2in7" | "27" => Ok(Self::Panel27),
            "2in9" | "29" => Ok(Self::Panel29),
            "4in2" | "42" => Ok(Self::Panel42),
            _ => Err(()),
        }
    }
}

/// Common arrangement: header strip, face center-left with a friend line
/// beneath, status to the right of the face, footer strip with counters.
fn scaled_layout(width: usize, height: usize) -> Layout {
    let header_h = 11;
    let footer_h = 12;
    Layout {
        width,
        height,
        name: pt(2, 1),
        channel: pt(width * 30 / 100, 1),
        aps: pt(width * 44 / 100, 1),
        uptime: pt(width - 62, 1),
        face: pt(0, header_h + 8),
        friend: pt(2, height - footer_h - 10),
        status: pt(width * 42 / 100, header_h + 12),
        shakes: pt(2, height - footer_h + 2),
        mode: pt(width - 26, height - footer_h + 2),
        bt: pt(width * 56 / 100, 1),
        gps: pt(width * 64 / 100, 1),
        battery: pt(width * 72 / 100, 1),
        memtemp: pt(width - 120, height - footer_h + 2),
        counters: pt(width * 28 / 100, height - footer_h + 2),
        header_rule_y: header_h,
        footer_rule_y: height - footer_h,
    }
}

/// Parse a preset name, warning and falling back to the 2.13" default on an
/// unknown name.
pub fn preset_or_default(name: &str) -> LayoutPreset {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(display = %name, "unknown display preset, using 2in13");
        LayoutPreset::Panel213
    })
}
