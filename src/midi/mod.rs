//! Standard MIDI File reading and event tokenizing.
//!
//! This module validates the chunk structure of a `.mid` file and decodes
//! track events one at a time. Nothing is materialized up front: each track
//! is read through its own [`TrackCursor`].

mod cursor;
mod error;
mod event;
mod reader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use cursor::{read_variable_length, TrackCursor};
pub use error::ParseError;
pub use event::{
    EventKind, NoteEvent, RawEvent, META_END_OF_TRACK, META_SET_TEMPO, META_TRACK_NAME,
};
pub use reader::{MidiDocument, TimeDivision};

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Number of MIDI note numbers.
pub const NOTE_COUNT: usize = 128;

/// Tempo assumed until the first SetTempo event: 500000 us per quarter (120 BPM).
pub const DEFAULT_TEMPO_US: u32 = 500_000;

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// # Examples
///
/// ```
/// use midivid::midi::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Converts a tick count to seconds.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `division` - Raw header time division (bit 15 set means SMPTE)
/// * `tempo` - Microseconds per quarter note; ignored for SMPTE timing
///
/// # Returns
///
/// Duration in seconds, or 0.0 when the division cannot express time
pub fn ticks_to_seconds(ticks: u32, division: u16, tempo: u32) -> f64 {
    match TimeDivision::from_raw(division) {
        TimeDivision::Timecode {
            fps,
            ticks_per_frame,
        } => {
            let ticks_per_second = fps as f64 * ticks_per_frame as f64;
            if ticks_per_second <= 0.0 {
                return 0.0;
            }
            ticks as f64 / ticks_per_second
        }
        TimeDivision::Metrical(0) => 0.0,
        TimeDivision::Metrical(ticks_per_quarter) => {
            let quarter_notes = ticks as f64 / ticks_per_quarter as f64;
            quarter_notes * (tempo as f64 / 1_000_000.0)
        }
    }
}

/// Converts seconds to ticks at a fixed tempo. Inverse of [`ticks_to_seconds`].
pub fn seconds_to_ticks(seconds: f64, division: u16, tempo: u32) -> u32 {
    match TimeDivision::from_raw(division) {
        TimeDivision::Timecode {
            fps,
            ticks_per_frame,
        } => (seconds * fps as f64 * ticks_per_frame as f64) as u32,
        TimeDivision::Metrical(ticks_per_quarter) => {
            if tempo == 0 {
                return 0;
            }
            let quarter_notes = seconds * 1_000_000.0 / tempo as f64;
            (quarter_notes * ticks_per_quarter as f64).round() as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_to_name(60), "C4");
        assert_eq!(note_to_name(69), "A4");
        assert_eq!(note_to_name(0), "C-1");
        assert_eq!(note_to_name(127), "G9");
    }

    #[test]
    fn test_tick_conversions() {
        // At 120 BPM, one quarter note = 0.5 seconds
        let seconds = ticks_to_seconds(480, 480, DEFAULT_TEMPO_US);
        assert!((seconds - 0.5).abs() < 1e-9);

        assert_eq!(seconds_to_ticks(0.5, 480, DEFAULT_TEMPO_US), 480);
    }

    #[test]
    fn test_smpte_ticks_to_seconds() {
        // 25 fps, 40 ticks per frame = 1000 ticks per second; tempo is ignored
        let division = 0xE728;
        assert!((ticks_to_seconds(1000, division, 123) - 1.0).abs() < 1e-12);
        assert!((ticks_to_seconds(250, division, DEFAULT_TEMPO_US) - 0.25).abs() < 1e-12);
        assert_eq!(seconds_to_ticks(2.0, division, 0), 2000);
    }

    #[test]
    fn test_zero_division_is_zero_time() {
        assert_eq!(ticks_to_seconds(480, 0, DEFAULT_TEMPO_US), 0.0);
    }
}
