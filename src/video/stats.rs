//! Recording statistics and the debug overlay.

use crate::playback::CLOCK_RATE;
use crate::render::{text_height, Color, Renderer};
use std::time::{Duration, Instant};

const PANEL_MARGIN: f32 = 15.0;
const PANEL_PADDING: f32 = 10.0;
const PANEL_BORDER: f32 = 2.0;
const TEXT_SCALE: f32 = 3.0;
const PANEL_WIDTH: f32 = 380.0;

/// Wall-clock throughput of a recording.
#[derive(Debug, Clone)]
pub struct RecordingStats {
    started: Instant,
    elapsed_seconds: f64,
    frames: u64,
    fps: f64,
    estimated_total_seconds: f64,
}

impl RecordingStats {
    /// Starts measuring now. `song_duration` seeds the ETA until real
    /// throughput is known.
    pub fn new(song_duration: f64) -> Self {
        Self {
            started: Instant::now(),
            elapsed_seconds: 0.0,
            frames: 0,
            fps: 0.0,
            estimated_total_seconds: song_duration,
        }
    }

    /// Refreshes the figures from wall-clock time since start.
    pub fn update(&mut self, frames: u64, progress: f64) {
        let elapsed = self.started.elapsed();
        self.update_with_elapsed(elapsed, frames, progress);
    }

    /// Refreshes the figures for a given elapsed time.
    pub fn update_with_elapsed(&mut self, elapsed: Duration, frames: u64, progress: f64) {
        self.elapsed_seconds = elapsed.as_secs_f64();
        self.frames = frames;
        if self.elapsed_seconds > 0.0 {
            self.fps = frames as f64 / self.elapsed_seconds;
            if progress > 0.0 {
                self.estimated_total_seconds = self.elapsed_seconds / progress;
            }
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames encoded per wall-clock second.
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Encoding speed relative to real-time playback.
    pub fn speed(&self) -> f64 {
        self.fps / CLOCK_RATE as f64
    }

    /// Estimated wall-clock seconds until the recording finishes.
    pub fn eta_seconds(&self) -> f64 {
        (self.estimated_total_seconds - self.elapsed_seconds).max(0.0)
    }

    /// Text lines shown in the overlay.
    pub fn overlay_lines(&self) -> Vec<String> {
        vec![
            format!("Elapsed: {}", format_duration(self.elapsed_seconds)),
            format!("ETA: {}", format_duration(self.eta_seconds())),
            format!("FrameCount: {}", self.frames),
            format!("FPS/Speed: {:.1}/{:.1}x", self.fps, self.speed()),
        ]
    }

    /// Draws the statistics panel in the bottom-left corner.
    pub fn draw_overlay(&self, renderer: &mut dyn Renderer) {
        let lines = self.overlay_lines();
        let line_height = text_height(TEXT_SCALE) * 1.6;
        let panel_height = lines.len() as f32 * line_height + PANEL_PADDING * 2.0;
        let x = PANEL_MARGIN;
        let y = renderer.height() as f32 - panel_height - PANEL_MARGIN;

        renderer.draw_rect(x, y, PANEL_WIDTH, panel_height, Color::BLACK.with_alpha(0.7));

        let border = Color::rgba(0.8, 0.8, 0.8, 1.0);
        renderer.draw_rect(x, y, PANEL_WIDTH, PANEL_BORDER, border);
        renderer.draw_rect(
            x,
            y + panel_height - PANEL_BORDER,
            PANEL_WIDTH,
            PANEL_BORDER,
            border,
        );
        renderer.draw_rect(x, y, PANEL_BORDER, panel_height, border);
        renderer.draw_rect(
            x + PANEL_WIDTH - PANEL_BORDER,
            y,
            PANEL_BORDER,
            panel_height,
            border,
        );

        for (i, line) in lines.iter().enumerate() {
            renderer.draw_text(
                line,
                x + PANEL_PADDING,
                y + PANEL_PADDING + i as f32 * line_height,
                TEXT_SCALE,
                Color::WHITE,
            );
        }
    }
}

/// Formats seconds as `H:MM:SS`, with a `Nd/` prefix past one day.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if days > 0 {
        format!("{}d/{}:{:02}:{:02}", days, hours, minutes, secs)
    } else {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    }
}
