//! Timing and playback.
//!
//! Converts tick positions into seconds through a tempo map, merges all
//! tracks into one time-ordered event stream, and drives that stream from a
//! fixed 60 Hz virtual clock.

mod clock;
mod error;
mod orchestrator;
mod scheduler;
mod tempo_map;

pub use clock::{PlaybackClock, CLOCK_RATE};
pub use error::PlaybackError;
pub use orchestrator::{FrameEvent, FrameStatus, Orchestrator, PlaybackState, TAIL_SECONDS};
pub use scheduler::{EventScheduler, PendingEvent, ScheduledNote, TIME_EPSILON};
pub use tempo_map::{ScanStats, TempoChange, TempoMap};
