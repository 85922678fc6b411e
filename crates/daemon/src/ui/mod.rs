// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI state, framebuffer, layouts, animation, and composition.

pub mod animation;
pub mod font;
pub mod framebuffer;
pub mod layout;
pub mod render;
pub mod state;

pub use animation::{Animation, AnimationKind, Face};
pub use framebuffer::{Bitmap, Framebuffer};
pub use layout::{Layout, LayoutPreset};
pub use state::{Mood, UiState, ATTACK_HOLD_MS};

use tokio::sync::Mutex;

use crate::ui::render::{FaceSource, GlyphSource};

struct UiInner {
    state: UiState,
    fb: Framebuffer,
    last_render_ms: u64,
}

/// Lock-guarded owner of UI state and the framebuffer.
///
/// Mutators run under [`Ui::update`]; the main loop pulls rendered
/// snapshots with [`Ui::snapshot_if_dirty`], rate-limited so the e-ink
/// panel is never asked to refresh faster than it can.
pub struct Ui {
    pub layout: Layout,
    font: Box<dyn GlyphSource>,
    faces: Box<dyn FaceSource>,
    inner: Mutex<UiInner>,
}

impl Ui {
    pub fn new(
        name: &str,
        layout: Layout,
        font: Box<dyn GlyphSource>,
        faces: Box<dyn FaceSource>,
        invert: bool,
    ) -> Self {
        let mut state = UiState::new(name);
        state.invert = invert;
        let fb = Framebuffer::new(layout.width, layout.height);
        Self { layout, font, faces, inner: Mutex::new(UiInner { state, fb, last_render_ms: 0 }) }
    }

    /// Run a mutation under the UI lock.
    pub async fn update<R>(&self, f: impl FnOnce(&mut UiState) -> R) -> R {
        let mut inner = self.inner.lock().await;
        f(&mut inner.state)
    }

    /// Render and return the frame bytes if the state is dirty and at least
    /// `min_interval_ms` passed since the previous render.
    pub async fn snapshot_if_dirty(&self, now_ms: u64, min_interval_ms: u64) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        if !inner.state.dirty || now_ms.saturating_sub(inner.last_render_ms) < min_interval_ms {
            return None;
        }
        let UiInner { state, fb, last_render_ms } = &mut *inner;
        render::render(state, &self.layout, fb, self.font.as_ref(), self.faces.as_ref());
        state.dirty = false;
        *last_render_ms = now_ms;
        Some(fb.bytes().to_vec())
    }
}
