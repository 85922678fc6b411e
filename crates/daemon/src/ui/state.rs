// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The single owner of mutable UI state.
//!
//! Everything the renderer reads lives here, guarded by one lock in the
//! [`Ui`] wrapper. Mood changes respect the attack-phase hold timer; the
//! "ready" mood is the one mood that breaks through it.

use crate::ui::animation::{Animation, AnimationKind, Face};

/// UI hold applied after attack-phase face changes, so a mood tick does not
/// immediately overwrite an excited face.
pub const ATTACK_HOLD_MS: u64 = 3000;

/// An upload animation still looping this long past the hold is stuck.
pub const UPLOAD_WATCHDOG_MS: u64 = 25_000;

/// Moods the policy layer can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Ready,
    Bored,
    Intense,
    Cool,
    Happy,
    Grateful,
    Excited,
    Motivated,
    Demotivated,
    Smart,
    Lonely,
    Sad,
    Angry,
    Sleeping,
    Broken,
    Debug,
}

impl Mood {
    pub fn face(self) -> Face {
        match self {
            Self::Ready => Face::Awake,
            Self::Bored => Face::Bored,
            Self::Intense => Face::Intense,
            Self::Cool => Face::Cool,
            Self::Happy => Face::Happy,
            Self::Grateful => Face::Grateful,
            Self::Excited => Face::Excited,
            Self::Motivated => Face::Motivated,
            Self::Demotivated => Face::Demotivated,
            Self::Smart => Face::Smart,
            Self::Lonely => Face::Lonely,
            Self::Sad => Face::Sad,
            Self::Angry => Face::Angry,
            Self::Sleeping => Face::Sleep,
            Self::Broken => Face::Broken,
            Self::Debug => Face::Debug,
        }
    }
}

/// Widget values, counters, and face selection state.
#[derive(Debug, Clone)]
pub struct UiState {
    pub name: String,
    pub status: String,
    pub channel: String,
    pub aps: String,
    pub uptime: String,
    pub shakes: String,
    pub mode: String,
    pub friend: String,
    pub bt: String,
    pub gps: String,
    pub battery: String,
    pub memtemp: String,

    pub pwds: u32,
    pub fhs: u32,
    pub phs: u32,
    pub tcaps: u32,
    pub xp: u64,
    pub level: u32,

    pub invert: bool,
    pub dirty: bool,

    mood: Mood,
    hold_until_ms: u64,
    pub animation: Animation,
}

impl UiState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: String::new(),
            channel: "CH *".to_owned(),
            aps: "APS 0".to_owned(),
            uptime: "UP 00:00:00".to_owned(),
            shakes: "PWND 0".to_owned(),
            mode: "AUTO".to_owned(),
            friend: String::new(),
            bt: String::new(),
            gps: String::new(),
            battery: String::new(),
            memtemp: String::new(),
            pwds: 0,
            fhs: 0,
            phs: 0,
            tcaps: 0,
            xp: 0,
            level: 1,
            invert: false,
            dirty: true,
            mood: Mood::Ready,
            hold_until_ms: 0,
            animation: Animation::default(),
        }
    }

    /// Face on screen right now: an active animation frame wins over the
    /// static mood face.
    pub fn face(&self) -> Face {
        self.animation.face().unwrap_or_else(|| self.mood.face())
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn hold_active(&self, now_ms: u64) -> bool {
        now_ms < self.hold_until_ms
    }

    pub fn set_status(&mut self, status: &str) {
        if self.status != status {
            self.status = status.to_owned();
            self.dirty = true;
        }
    }

    /// Mood-driven change: skipped while the hold timer runs, except Ready,
    /// which breaks through and also clears the timer.
    pub fn set_mood(&mut self, mood: Mood, now_ms: u64) -> bool {
        if self.hold_active(now_ms) {
            if mood != Mood::Ready {
                return false;
            }
            self.hold_until_ms = 0;
        }
        if self.mood != mood {
            self.mood = mood;
            self.dirty = true;
        }
        true
    }

    /// Attack-phase change: applies unconditionally and extends the hold.
    pub fn attack_mood(&mut self, mood: Mood, now_ms: u64) {
        if self.mood != mood {
            self.mood = mood;
            self.dirty = true;
        }
        self.extend_hold(now_ms);
    }

    pub fn extend_hold(&mut self, now_ms: u64) {
        self.hold_until_ms = self.hold_until_ms.max(now_ms + ATTACK_HOLD_MS);
    }

    pub fn start_animation(&mut self, kind: AnimationKind, interval_ms: u64, now_ms: u64) {
        self.animation.start(kind, interval_ms, now_ms);
        self.dirty = true;
    }

    pub fn tick_animation(&mut self, now_ms: u64) {
        if self.animation.tick(now_ms) {
            self.dirty = true;
        }
    }

    /// Force-stop an upload animation that outlived the hold window. The
    /// face falls back to the current mood.
    pub fn upload_watchdog(&mut self, now_ms: u64) -> bool {
        if self.animation.kind() == Some(AnimationKind::Upload)
            && now_ms > self.animation.started_ms() + ATTACK_HOLD_MS + UPLOAD_WATCHDOG_MS
        {
            self.animation.stop();
            self.dirty = true;
            return true;
        }
        false
    }

    pub fn set_counters(&mut self, pwds: u32, fhs: u32, phs: u32, tcaps: u32) {
        if (self.pwds, self.fhs, self.phs, self.tcaps) != (pwds, fhs, phs, tcaps) {
            self.pwds = pwds;
            self.fhs = fhs;
            self.phs = phs;
            self.tcaps = tcaps;
            self.dirty = true;
        }
    }

    pub fn counters_line(&self) -> String {
        format!(
            "PWD {}  FHS {}  PHS {}  CAP {}",
            self.pwds, self.fhs, self.phs, self.tcaps
        )
    }

    /// Award experience; levels follow a triangular schedule.
    pub fn award_xp(&mut self, amount: u64) {
        self.xp += amount;
        while self.xp >= xp_for_level(self.level + 1) {
            self.level += 1;
            self.dirty = true;
        }
        self.dirty = true;
    }
}

/// Total XP required to reach `level`.
fn xp_for_level(level: u32) -> u64 {
    let n = u64::from(level.saturating_sub(1));
    50 * n * (n + 1)
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
