//! Fixed-step virtual clock.
//!
//! Time advances by exactly one 1/60 s frame per tick. Wall-clock deltas are
//! never consulted, so a render produces identical output no matter how fast
//! the machine or the encoder runs.

/// Frames per second of the virtual timeline.
pub const CLOCK_RATE: u32 = 60;

const FRAME_TOLERANCE: f64 = 1e-6;

/// Frame counter and the time derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackClock {
    frame: u64,
    current_time: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames advanced since the last reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Current position in seconds.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Advances one frame and returns the new time.
    ///
    /// Time is recomputed from the frame count rather than accumulated, so
    /// after K ticks it is exactly `K / 60`.
    pub fn tick(&mut self) -> f64 {
        self.frame += 1;
        self.current_time = Self::frame_time(self.frame);
        self.current_time
    }

    /// Rewinds to frame 0.
    pub fn reset(&mut self) {
        self.frame = 0;
        self.current_time = 0.0;
    }

    /// Jumps to `seconds`, placing the frame counter on the nearest frame at
    /// or before it so later ticks stay on the 1/60 s grid.
    pub fn seek_to(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        // Tolerate rounding so seeking to frame_time(k) lands on frame k.
        self.frame = (seconds * CLOCK_RATE as f64 + FRAME_TOLERANCE).floor() as u64;
        self.current_time = seconds;
    }

    /// Time of a given frame index.
    pub fn frame_time(frame: u64) -> f64 {
        frame as f64 / CLOCK_RATE as f64
    }
}
