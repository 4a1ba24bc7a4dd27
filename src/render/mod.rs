//! Drawing and readback interfaces.
//!
//! The playback core never touches a concrete backend. It drives a
//! [`Keyboard`] with note state and blips, and a [`Renderer`] with a handful
//! of drawing primitives and a framebuffer readback.

mod keystrip;
mod software;

pub use keystrip::{clear_background, is_black_key, KeyStrip, BLIP_DURATION};
pub use software::{text_height, text_width, SoftwareRenderer};

/// An RGBA color with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from a 0xRRGGBB value.
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
            a: 1.0,
        }
    }

    /// Same color with a different alpha.
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Per-component average of two colors.
    pub fn average(self, other: Color) -> Self {
        Self {
            r: (self.r + other.r) * 0.5,
            g: (self.g + other.g) * 0.5,
            b: (self.b + other.b) * 0.5,
            a: (self.a + other.a) * 0.5,
        }
    }

    /// Composites `self` over `dst` using `self.a`.
    pub fn over(self, dst: Color) -> Self {
        let a = self.a.clamp(0.0, 1.0);
        Self {
            r: self.r * a + dst.r * (1.0 - a),
            g: self.g * a + dst.g * (1.0 - a),
            b: self.b * a + dst.b * (1.0 - a),
            a: a + dst.a * (1.0 - a),
        }
    }

    /// Converts to 8-bit RGBA.
    pub fn to_rgba8(self) -> [u8; 4] {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [
            quantize(self.r),
            quantize(self.g),
            quantize(self.b),
            quantize(self.a),
        ]
    }

    pub fn from_rgba8(px: [u8; 4]) -> Self {
        Self::rgba(
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
            px[3] as f32 / 255.0,
        )
    }
}

/// Color palette for visualizing MIDI channels.
pub const CHANNEL_COLORS: [Color; 16] = [
    Color::from_hex(0x3366FF),
    Color::from_hex(0xFF7E33),
    Color::from_hex(0x33FF66),
    Color::from_hex(0xFF3381),
    Color::from_hex(0x33FFFF),
    Color::from_hex(0xE433FF),
    Color::from_hex(0x99FF33),
    Color::from_hex(0x4B33FF),
    Color::from_hex(0xFFCC33),
    Color::from_hex(0x33B4FF),
    Color::from_hex(0xFF3333),
    Color::from_hex(0x33FFB1),
    Color::from_hex(0xFF33CC),
    Color::from_hex(0x4EFF33),
    Color::from_hex(0x9933FF),
    Color::from_hex(0xE7FF33),
];

/// Gets the palette color for a channel or track index (wraps every 16).
pub fn palette_color(index: usize) -> Color {
    CHANNEL_COLORS[index & 0x0F]
}

/// Drawing primitives plus framebuffer readback.
pub trait Renderer {
    /// Output width in pixels.
    fn width(&self) -> u32;

    /// Output height in pixels.
    fn height(&self) -> u32;

    /// Fills the whole target with `color`.
    fn clear(&mut self, color: Color);

    /// Fills a rectangle, blending by `color.a`. Coordinates are pixels from
    /// the top-left corner and may extend past the edges.
    fn draw_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color);

    /// Draws a single line of text with its top-left corner at (x, y).
    fn draw_text(&mut self, text: &str, x: f32, y: f32, scale: f32, color: Color);

    /// Reads back the rendered image as RGBA8, row-major from the top-left.
    ///
    /// The result always holds `width * height * 4` bytes; areas outside the
    /// render target read as opaque black.
    fn read_framebuffer(&mut self, width: u32, height: u32) -> Vec<u8>;
}

/// Visual consumer of note state.
pub trait Keyboard {
    /// Marks a key as held or released.
    fn set_key_pressed(&mut self, note: u8, pressed: bool);

    /// Triggers a short flash on a key.
    fn add_blip(&mut self, note: u8, color: Color);

    /// Sets the color a held key is drawn with, without a flash.
    fn set_key_color(&mut self, note: u8, color: Color);

    /// Drops every blip still animating.
    fn clear_blips(&mut self);

    /// Advances blip animations by `dt` seconds.
    fn update(&mut self, dt: f64);

    /// Draws the keyboard.
    fn draw(&self, renderer: &mut dyn Renderer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let c = Color::from_hex(0x3366FF);
        assert_eq!(c.to_rgba8(), [0x33, 0x66, 0xFF, 0xFF]);
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(palette_color(0), CHANNEL_COLORS[0]);
        assert_eq!(palette_color(17), CHANNEL_COLORS[1]);
        assert_eq!(palette_color(15).to_rgba8(), [0xE7, 0xFF, 0x33, 0xFF]);
    }

    #[test]
    fn test_average_and_over() {
        let avg = Color::BLACK.average(Color::WHITE);
        assert_eq!(avg.to_rgba8(), [128, 128, 128, 255]);

        let half = Color::WHITE.with_alpha(0.5).over(Color::BLACK);
        assert_eq!(half.to_rgba8(), [128, 128, 128, 255]);
        assert_eq!(Color::WHITE.over(Color::BLACK), Color::WHITE);
    }
}
