//! CPU framebuffer renderer.
//!
//! Keeps an RGBA8 image in memory. Readback is a copy, which makes this the
//! renderer used for headless rendering and in tests.

use super::{Color, Renderer};

/// Glyph cell size of the built-in bitmap font, in font pixels.
const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
/// Horizontal advance per character, in font pixels.
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Bitmap for a character; each row is three bits, MSB on the left.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        ' ' => [0, 0, 0, 0, 0],
        '0' => [7, 5, 5, 5, 7],
        '1' => [2, 6, 2, 2, 7],
        '2' => [7, 1, 7, 4, 7],
        '3' => [7, 1, 7, 1, 7],
        '4' => [5, 5, 7, 1, 1],
        '5' => [7, 4, 7, 1, 7],
        '6' => [7, 4, 7, 5, 7],
        '7' => [7, 1, 1, 1, 1],
        '8' => [7, 5, 7, 5, 7],
        '9' => [7, 5, 7, 1, 7],
        'A' => [2, 5, 7, 5, 5],
        'B' => [6, 5, 6, 5, 6],
        'C' => [3, 4, 4, 4, 3],
        'D' => [6, 5, 5, 5, 6],
        'E' => [7, 4, 6, 4, 7],
        'F' => [7, 4, 6, 4, 4],
        'G' => [3, 4, 5, 5, 3],
        'H' => [5, 5, 7, 5, 5],
        'I' => [7, 2, 2, 2, 7],
        'J' => [1, 1, 1, 5, 2],
        'K' => [5, 5, 6, 5, 5],
        'L' => [4, 4, 4, 4, 7],
        'M' => [5, 7, 7, 5, 5],
        'N' => [6, 5, 5, 5, 5],
        'O' => [2, 5, 5, 5, 2],
        'P' => [6, 5, 6, 4, 4],
        'Q' => [2, 5, 5, 6, 3],
        'R' => [6, 5, 6, 5, 5],
        'S' => [3, 4, 2, 1, 6],
        'T' => [7, 2, 2, 2, 2],
        'U' => [5, 5, 5, 5, 7],
        'V' => [5, 5, 5, 5, 2],
        'W' => [5, 5, 7, 7, 5],
        'X' => [5, 5, 2, 5, 5],
        'Y' => [5, 5, 2, 2, 2],
        'Z' => [7, 1, 2, 4, 7],
        ':' => [0, 2, 0, 2, 0],
        '.' => [0, 0, 0, 0, 2],
        ',' => [0, 0, 0, 2, 4],
        '-' => [0, 0, 7, 0, 0],
        '+' => [0, 2, 7, 2, 0],
        '/' => [1, 1, 2, 4, 4],
        '%' => [5, 1, 2, 4, 5],
        '(' => [1, 2, 2, 2, 1],
        ')' => [4, 2, 2, 2, 4],
        _ => [7, 1, 2, 0, 2],
    }
}

/// Width in pixels of `text` drawn at `scale`.
pub fn text_width(text: &str, scale: f32) -> f32 {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return 0.0;
    }
    (chars * GLYPH_ADVANCE - 1) as f32 * scale
}

/// Height in pixels of one text line drawn at `scale`.
pub fn text_height(scale: f32) -> f32 {
    GLYPH_HEIGHT as f32 * scale
}

/// In-memory RGBA8 render target.
#[derive(Debug, Clone)]
pub struct SoftwareRenderer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SoftwareRenderer {
    /// Creates an opaque black target of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let mut renderer = Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        };
        renderer.clear(Color::BLACK);
        renderer
    }

    /// Color of one pixel, or `None` outside the target.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.pixels[i..i + 4]);
        Some(px)
    }

    fn clip_span(start: f32, len: f32, limit: u32) -> (u32, u32) {
        let lo = start.floor().max(0.0).min(limit as f32) as u32;
        let hi = (start + len).ceil().max(0.0).min(limit as f32) as u32;
        (lo, hi)
    }
}

impl Renderer for SoftwareRenderer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self, color: Color) {
        let px = color.to_rgba8();
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
    }

    fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if w <= 0.0 || h <= 0.0 || color.a <= 0.0 {
            return;
        }
        let (x0, x1) = Self::clip_span(x, w, self.width);
        let (y0, y1) = Self::clip_span(y, h, self.height);
        let opaque = color.a >= 1.0;
        let solid = color.to_rgba8();
        let stride = self.width as usize * 4;

        for row in y0..y1 {
            let line = &mut self.pixels[row as usize * stride..(row as usize + 1) * stride];
            for col in x0..x1 {
                let i = col as usize * 4;
                let px = &mut line[i..i + 4];
                if opaque {
                    px.copy_from_slice(&solid);
                } else {
                    let dst = Color::from_rgba8([px[0], px[1], px[2], px[3]]);
                    px.copy_from_slice(&color.over(dst).to_rgba8());
                }
            }
        }
    }

    fn draw_text(&mut self, text: &str, x: f32, y: f32, scale: f32, color: Color) {
        let scale = scale.max(1.0);
        let mut pen_x = x;
        for c in text.chars() {
            let rows = glyph(c);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) != 0 {
                        self.draw_rect(
                            pen_x + col as f32 * scale,
                            y + row as f32 * scale,
                            scale,
                            scale,
                            color,
                        );
                    }
                }
            }
            pen_x += GLYPH_ADVANCE as f32 * scale;
        }
    }

    fn read_framebuffer(&mut self, width: u32, height: u32) -> Vec<u8> {
        if width == self.width && height == self.height {
            return self.pixels.clone();
        }

        let mut out = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width as usize * height as usize {
            out.extend_from_slice(&Color::BLACK.to_rgba8());
        }
        let copy_w = width.min(self.width) as usize * 4;
        for row in 0..height.min(self.height) as usize {
            let src = row * self.width as usize * 4;
            let dst = row * width as usize * 4;
            out[dst..dst + copy_w].copy_from_slice(&self.pixels[src..src + copy_w]);
        }
        out
    }
}
