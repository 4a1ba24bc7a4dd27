//! midivid - Renders MIDI files to video through an external encoder.
//!
//! The library parses Standard MIDI Files, maps ticks to seconds through the
//! tempo map, plays the merged event stream on a fixed 60 Hz clock and pipes
//! rendered RGBA frames into an ffmpeg process.

pub mod midi;
pub mod playback;
pub mod render;
pub mod session;
pub mod video;

// Re-export commonly used types
pub use midi::{MidiDocument, ParseError};
pub use playback::{Orchestrator, PlaybackError, PlaybackState};
pub use render::{KeyStrip, Keyboard, Renderer, SoftwareRenderer};
pub use session::{Session, StepOutcome};
pub use video::{ColorMode, EncoderPipe, VideoSettings};
