// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Widget compositor: draws a consistent UI snapshot into the framebuffer.
//!
//! Glyph rasterization and face artwork come from outside the core through
//! the [`GlyphSource`] and [`FaceSource`] traits; the compositor only
//! places bitmaps.

use crate::ui::animation::Face;
use crate::ui::framebuffer::{Bitmap, Framebuffer};
use crate::ui::layout::Layout;
use crate::ui::state::UiState;

/// Provides rendered glyphs for a fixed-pitch font.
pub trait GlyphSource: Send + Sync {
    fn glyph(&self, c: char) -> Option<Bitmap>;
    /// Horizontal advance per character, including spacing.
    fn advance(&self) -> usize;
    fn line_height(&self) -> usize;
}

/// Provides face artwork for each [`Face`].
pub trait FaceSource: Send + Sync {
    fn face(&self, face: Face) -> Option<Bitmap>;
}

/// Draw a single line of text. Characters past the right edge clip.
pub fn draw_text(
    fb: &mut Framebuffer,
    x: usize,
    y: usize,
    text: &str,
    font: &dyn GlyphSource,
    white: bool,
) {
    let mut cursor = x;
    for c in text.chars() {
        if let Some(glyph) = font.glyph(c) {
            fb.blit(cursor, y, &glyph, white);
        }
        cursor += font.advance();
        if cursor >= fb.width() {
            break;
        }
    }
}

/// Compose the whole UI into the framebuffer.
pub fn render(
    state: &UiState,
    layout: &Layout,
    fb: &mut Framebuffer,
    font: &dyn GlyphSource,
    faces: &dyn FaceSource,
) {
    fb.clear(true);
    let ink = false; // black on white; inversion is applied last

    // Header
    draw_text(fb, layout.name.x, layout.name.y, &state.name, font, ink);
    draw_text(fb, layout.channel.x, layout.channel.y, &state.channel, font, ink);
    draw_text(fb, layout.aps.x, layout.aps.y, &state.aps, font, ink);
    draw_text(fb, layout.uptime.x, layout.uptime.y, &state.uptime, font, ink);
    draw_text(fb, layout.bt.x, layout.bt.y, &state.bt, font, ink);
    draw_text(fb, layout.gps.x, layout.gps.y, &state.gps, font, ink);
    draw_text(fb, layout.battery.x, layout.battery.y, &state.battery, font, ink);
    fb.hline(0, layout.header_rule_y, layout.width, ink);

    // Face, scaled 3:2 from the source art.
    if let Some(bitmap) = faces.face(state.face()) {
        fb.blit_scaled_3_2(layout.face.x, layout.face.y, &bitmap, ink);
    }
    draw_text(fb, layout.friend.x, layout.friend.y, &state.friend, font, ink);

    // Status, wrapped on width.
    let status_cols = (layout.width.saturating_sub(layout.status.x)) / font.advance().max(1);
    let mut y = layout.status.y;
    for line in wrap(&state.status, status_cols.max(1)) {
        draw_text(fb, layout.status.x, y, &line, font, ink);
        y += font.line_height();
        if y >= layout.footer_rule_y {
            break;
        }
    }

    // Footer
    fb.hline(0, layout.footer_rule_y, layout.width, ink);
    draw_text(fb, layout.shakes.x, layout.shakes.y, &state.shakes, font, ink);
    draw_text(fb, layout.counters.x, layout.counters.y, &state.counters_line(), font, ink);
    draw_text(fb, layout.memtemp.x, layout.memtemp.y, &state.memtemp, font, ink);
    draw_text(fb, layout.mode.x, layout.mode.y, &state.mode, font, ink);

    if state.invert {
        fb.invert();
    }
}

/// Greedy word wrap to a column budget.
fn wrap(text: &str, cols: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_owned();
        } else if current.chars().count() + 1 + word.chars().count() <= cols {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_owned();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// -- Default face art ---------------------------------------------------------

/// Emoticon face art rasterized through the glyph source. Theme packages
/// replace this with bitmap art; the emoticons keep bare installs usable.
pub struct AsciiFaces<G: GlyphSource> {
    font: G,
}

impl<G: GlyphSource> AsciiFaces<G> {
    pub fn new(font: G) -> Self {
        Self { font }
    }
}

fn face_text(face: Face) -> &'static str {
    match face {
        Face::Awake => "(o_o)",
        Face::Bored => "(-_-)",
        Face::Intense => "(0_0)",
        Face::Cool => "(B_B)",
        Face::Happy => "(^_^)",
        Face::Grateful => "(n_n)",
        Face::Excited => "(*_*)",
        Face::Motivated => "(+_+)",
        Face::Demotivated => "(=_=)",
        Face::Smart => "(e_e)",
        Face::Lonely => "(;_;)",
        Face::Sad => "(T_T)",
        Face::Angry => "(>_<)",
        Face::Friend => "(@_@)",
        Face::Broken => "(x_x)",
        Face::Debug => "(#_#)",
        Face::LookR => "(o_o)>",
        Face::LookL => "<(o_o)",
        Face::LookRHappy => "(^_^)>",
        Face::LookLHappy => "<(^_^)",
        Face::Upload => "(1_1)",
        Face::Upload1 => "(2_2)",
        Face::Upload2 => "(3_3)",
        Face::Download => "(v_v)",
        Face::Download1 => "(V_V)",
        Face::Sleep => "(z_z)",
        Face::Sleep2 => "(Z_Z)",
    }
}

impl<G: GlyphSource> FaceSource for AsciiFaces<G> {
    fn face(&self, face: Face) -> Option<Bitmap> {
        let text = face_text(face);
        let advance = self.font.advance();
        let mut bitmap = Bitmap::new(text.chars().count() * advance, self.font.line_height());
        let mut x = 0;
        for c in text.chars() {
            if let Some(glyph) = self.font.glyph(c) {
                for gy in 0..glyph.height {
                    for gx in 0..glyph.width {
                        if glyph.get(gx, gy) {
                            bitmap.set(x + gx, gy, true);
                        }
                    }
                }
            }
            x += advance;
        }
        Some(bitmap)
    }
}
