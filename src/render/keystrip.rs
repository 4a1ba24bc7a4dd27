//! Full 128-key piano strip.
//!
//! Draws every MIDI note along the bottom of the frame. Held keys take the
//! color of the blip that pressed them, and each note-on leaves a flash
//! above its key that fades out over [`BLIP_DURATION`] seconds.

use super::{Color, Keyboard, Renderer};
use crate::midi::NOTE_COUNT;

/// Lifetime of a blip in seconds.
pub const BLIP_DURATION: f64 = 0.25;

/// Fraction of the frame height taken by the keys.
const KEYBOARD_HEIGHT_RATIO: f32 = 0.18;
/// Black keys relative to white keys.
const BLACK_KEY_WIDTH_RATIO: f32 = 0.6;
const BLACK_KEY_HEIGHT_RATIO: f32 = 0.62;
/// Tallest blip, relative to the keyboard height.
const BLIP_HEIGHT_RATIO: f32 = 0.5;

const BACKGROUND: Color = Color::from_hex(0x101014);
const WHITE_KEY: Color = Color::from_hex(0xF2F2F2);
const BLACK_KEY: Color = Color::from_hex(0x1C1C1C);
const KEY_GAP: Color = Color::from_hex(0x404040);

/// Checks whether a note number falls on a black key.
pub fn is_black_key(note: u8) -> bool {
    matches!(note % 12, 1 | 3 | 6 | 8 | 10)
}

#[derive(Debug, Clone, Copy)]
struct Blip {
    note: u8,
    color: Color,
    remaining: f64,
}

/// Key state plus blip animation for all 128 notes.
#[derive(Debug, Clone)]
pub struct KeyStrip {
    pressed: [bool; NOTE_COUNT],
    key_colors: [Option<Color>; NOTE_COUNT],
    blips: Vec<Blip>,
}

impl Default for KeyStrip {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStrip {
    pub fn new() -> Self {
        Self {
            pressed: [false; NOTE_COUNT],
            key_colors: [None; NOTE_COUNT],
            blips: Vec::new(),
        }
    }

    /// Whether `note` is currently held.
    pub fn is_pressed(&self, note: u8) -> bool {
        self.pressed.get(note as usize).copied().unwrap_or(false)
    }

    /// Number of held keys.
    pub fn pressed_count(&self) -> usize {
        self.pressed.iter().filter(|&&p| p).count()
    }

    /// Number of blips still animating.
    pub fn blip_count(&self) -> usize {
        self.blips.len()
    }

    /// Horizontal extent of a key for a strip `width` pixels wide.
    fn key_span(note: u8, width: f32) -> (f32, f32) {
        let white_count = (0..NOTE_COUNT as u8).filter(|&n| !is_black_key(n)).count() as f32;
        let white_width = width / white_count;
        let whites_before = (0..note).filter(|&n| !is_black_key(n)).count() as f32;

        if is_black_key(note) {
            let w = white_width * BLACK_KEY_WIDTH_RATIO;
            (whites_before * white_width - w * 0.5, w)
        } else {
            (whites_before * white_width, white_width)
        }
    }
}

impl Keyboard for KeyStrip {
    fn set_key_pressed(&mut self, note: u8, pressed: bool) {
        let Some(slot) = self.pressed.get_mut(note as usize) else {
            return;
        };
        *slot = pressed;
        if !pressed {
            self.key_colors[note as usize] = None;
        }
    }

    fn add_blip(&mut self, note: u8, color: Color) {
        if note as usize >= NOTE_COUNT {
            return;
        }
        self.key_colors[note as usize] = Some(color);
        self.blips.push(Blip {
            note,
            color,
            remaining: BLIP_DURATION,
        });
    }

    fn set_key_color(&mut self, note: u8, color: Color) {
        if let Some(slot) = self.key_colors.get_mut(note as usize) {
            *slot = Some(color);
        }
    }

    fn clear_blips(&mut self) {
        self.blips.clear();
    }

    fn update(&mut self, dt: f64) {
        for blip in &mut self.blips {
            blip.remaining -= dt;
        }
        self.blips.retain(|blip| blip.remaining > 0.0);
    }

    fn draw(&self, renderer: &mut dyn Renderer) {
        let width = renderer.width() as f32;
        let height = renderer.height() as f32;
        let key_height = (height * KEYBOARD_HEIGHT_RATIO).max(1.0);
        let top = height - key_height;

        renderer.draw_rect(0.0, top, width, key_height, KEY_GAP);

        // White keys first so black keys overlap them
        for note in (0..NOTE_COUNT as u8).filter(|&n| !is_black_key(n)) {
            let (x, w) = Self::key_span(note, width);
            let color = match self.key_colors[note as usize] {
                Some(c) if self.pressed[note as usize] => c,
                _ if self.pressed[note as usize] => WHITE_KEY.average(Color::BLACK),
                _ => WHITE_KEY,
            };
            renderer.draw_rect(x + 0.5, top, (w - 1.0).max(1.0), key_height, color);
        }

        for note in (0..NOTE_COUNT as u8).filter(|&n| is_black_key(n)) {
            let (x, w) = Self::key_span(note, width);
            let color = match self.key_colors[note as usize] {
                Some(c) if self.pressed[note as usize] => c.average(BLACK_KEY),
                _ if self.pressed[note as usize] => WHITE_KEY.average(BLACK_KEY),
                _ => BLACK_KEY,
            };
            renderer.draw_rect(x, top, w, key_height * BLACK_KEY_HEIGHT_RATIO, color);
        }

        for blip in &self.blips {
            let life = (blip.remaining / BLIP_DURATION).clamp(0.0, 1.0) as f32;
            let (x, w) = Self::key_span(blip.note, width);
            let h = key_height * BLIP_HEIGHT_RATIO * life;
            renderer.draw_rect(x, top - h, w, h, blip.color.with_alpha(life));
        }
    }
}

/// Clears the background to the strip's backdrop color.
pub fn clear_background(renderer: &mut dyn Renderer) {
    renderer.clear(BACKGROUND);
}
