//! Standard MIDI File chunk reader.
//!
//! Validates the `MThd` header and locates every `MTrk` chunk. Events are
//! not decoded here; each track is kept as a byte span of the shared buffer
//! and decoded lazily through a [`TrackCursor`].

use super::cursor::TrackCursor;
use super::error::ParseError;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

const HEADER_MAGIC: &[u8; 4] = b"MThd";
const TRACK_MAGIC: &[u8; 4] = b"MTrk";

/// Size of the fixed header: magic, chunk size, format, track count, division.
const HEADER_LEN: usize = 14;

/// Size of a track chunk preamble: magic and chunk size.
const TRACK_HEADER_LEN: usize = 8;

/// Decoded form of the header's time division field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDivision {
    /// Ticks per quarter note.
    Metrical(u16),
    /// Frame-based timing.
    Timecode { fps: u8, ticks_per_frame: u8 },
}

impl TimeDivision {
    /// Decodes the raw 16-bit division. Bit 15 set selects SMPTE timing,
    /// where the high byte is the negated frame rate as a signed 8-bit value.
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x8000 != 0 {
            let fps = -(((raw >> 8) as u8 as i8) as i16);
            TimeDivision::Timecode {
                fps: fps.clamp(0, u8::MAX as i16) as u8,
                ticks_per_frame: (raw & 0xFF) as u8,
            }
        } else {
            TimeDivision::Metrical(raw)
        }
    }
}

/// A loaded MIDI file: header fields plus the byte span of each track.
///
/// Immutable after load. Cursors share the underlying buffer.
#[derive(Debug, Clone)]
pub struct MidiDocument {
    /// SMF format type (0, 1 or 2; other values are accepted with a warning).
    pub format: u16,
    /// Raw time division field.
    pub division: u16,
    data: Arc<[u8]>,
    tracks: Vec<Range<usize>>,
}

impl MidiDocument {
    /// Reads and parses a MIDI file from disk.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Io` if the file cannot be read, otherwise any
    /// error from [`MidiDocument::parse`].
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ParseError> {
        let data = fs::read(path.as_ref())?;
        Self::parse(data)
    }

    /// Parses a MIDI document from an in-memory buffer.
    ///
    /// # Errors
    ///
    /// - `InvalidHeader` if the file does not start with `MThd` or declares zero tracks
    /// - `CorruptedData` if the buffer is too short, a track chunk cannot be
    ///   located, or a chunk declares more bytes than remain
    pub fn parse(data: impl Into<Arc<[u8]>>) -> Result<Self, ParseError> {
        let data: Arc<[u8]> = data.into();

        if data.len() < HEADER_LEN {
            return Err(ParseError::CorruptedData(format!(
                "buffer of {} bytes is too short for a header",
                data.len()
            )));
        }
        if &data[0..4] != HEADER_MAGIC {
            return Err(ParseError::InvalidHeader(
                "missing MThd signature".to_string(),
            ));
        }

        let chunk_size = read_u32(&data, 4);
        if chunk_size != 6 {
            tracing::warn!("Non-standard header size: {}", chunk_size);
        }
        let format = read_u16(&data, 8);
        if format > 2 {
            tracing::warn!("Unsupported format type: {}", format);
        }
        let track_count = read_u16(&data, 10);
        if track_count == 0 {
            return Err(ParseError::InvalidHeader(
                "header declares no tracks".to_string(),
            ));
        }
        let division = read_u16(&data, 12);

        let mut tracks = Vec::with_capacity(track_count as usize);
        let mut pos = HEADER_LEN;

        for i in 0..track_count as usize {
            if data.len() - pos < TRACK_HEADER_LEN {
                return Err(ParseError::CorruptedData(format!(
                    "insufficient data for track {} header",
                    i
                )));
            }

            if &data[pos..pos + 4] != TRACK_MAGIC {
                tracing::warn!(
                    "Invalid track {} header signature {:?}, scanning for MTrk",
                    i,
                    String::from_utf8_lossy(&data[pos..pos + 4])
                );
                let offset = find_track_magic(&data[pos + 1..]).ok_or_else(|| {
                    ParseError::CorruptedData(format!(
                        "could not find a valid header for track {}",
                        i
                    ))
                })?;
                pos += 1 + offset;
                if data.len() - pos < TRACK_HEADER_LEN {
                    return Err(ParseError::CorruptedData(format!(
                        "insufficient data for track {} header",
                        i
                    )));
                }
            }

            let size = read_u32(&data, pos + 4) as usize;
            pos += TRACK_HEADER_LEN;

            let remaining = data.len() - pos;
            if remaining < size {
                return Err(ParseError::CorruptedData(format!(
                    "track {} declares {} bytes but only {} remain",
                    i, size, remaining
                )));
            }

            tracks.push(pos..pos + size);
            pos += size;
        }

        if pos < data.len() {
            tracing::debug!("{} trailing bytes after last track", data.len() - pos);
        }

        Ok(Self {
            format,
            division,
            data,
            tracks,
        })
    }

    /// Number of tracks.
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Byte span of a track within the document buffer.
    pub fn track_span(&self, index: usize) -> Option<Range<usize>> {
        self.tracks.get(index).cloned()
    }

    /// Decoded time division.
    pub fn time_division(&self) -> TimeDivision {
        TimeDivision::from_raw(self.division)
    }

    /// Creates a fresh cursor positioned at the start of a track.
    pub fn cursor(&self, index: usize) -> Option<TrackCursor> {
        let span = self.tracks.get(index)?.clone();
        Some(TrackCursor::new(Arc::clone(&self.data), index, span))
    }

    /// Creates one fresh cursor per track, in track order.
    pub fn cursors(&self) -> Vec<TrackCursor> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(i, span)| TrackCursor::new(Arc::clone(&self.data), i, span.clone()))
            .collect()
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn find_track_magic(data: &[u8]) -> Option<usize> {
    data.windows(TRACK_MAGIC.len())
        .position(|window| window == TRACK_MAGIC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(format: u16, tracks: u16, division: u16) -> Vec<u8> {
        let mut bytes = b"MThd".to_vec();
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&format.to_be_bytes());
        bytes.extend_from_slice(&tracks.to_be_bytes());
        bytes.extend_from_slice(&division.to_be_bytes());
        bytes
    }

    fn track(body: &[u8]) -> Vec<u8> {
        let mut bytes = b"MTrk".to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    const END_OF_TRACK: [u8; 4] = [0x00, 0xFF, 0x2F, 0x00];

    #[test]
    fn test_parse_two_tracks() {
        let mut bytes = header(1, 2, 480);
        bytes.extend(track(&END_OF_TRACK));
        bytes.extend(track(&[0x00, 0x90, 60, 100, 0x00, 0xFF, 0x2F, 0x00]));

        let doc = MidiDocument::parse(bytes).unwrap();
        assert_eq!(doc.format, 1);
        assert_eq!(doc.track_count(), 2);
        assert_eq!(doc.time_division(), TimeDivision::Metrical(480));
        assert_eq!(doc.track_span(0).unwrap().len(), 4);
        assert_eq!(doc.track_span(1).unwrap().len(), 8);

        let mut cursor = doc.cursor(1).unwrap();
        assert!(cursor.next_event().unwrap().is_note_on());
    }

    #[test]
    fn test_bad_magic_is_invalid_header() {
        let mut bytes = header(0, 1, 96);
        bytes[0] = b'X';
        bytes.extend(track(&END_OF_TRACK));
        assert!(matches!(
            MidiDocument::parse(bytes),
            Err(ParseError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_zero_tracks_rejected() {
        let bytes = header(0, 0, 96);
        assert!(matches!(
            MidiDocument::parse(bytes),
            Err(ParseError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_short_buffer_is_corrupted() {
        assert!(matches!(
            MidiDocument::parse(b"MThd".to_vec()),
            Err(ParseError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_chunk_size_exceeding_buffer_is_corrupted() {
        let mut bytes = header(0, 1, 96);
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(&END_OF_TRACK);
        assert!(matches!(
            MidiDocument::parse(bytes),
            Err(ParseError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_missing_track_is_corrupted() {
        let mut bytes = header(1, 2, 96);
        bytes.extend(track(&END_OF_TRACK));
        assert!(matches!(
            MidiDocument::parse(bytes),
            Err(ParseError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_recovers_misaligned_track() {
        let mut bytes = header(0, 1, 96);
        bytes.extend_from_slice(&[0x00, 0x00, 0x01]);
        bytes.extend(track(&[0x00, 0x90, 60, 100]));

        let doc = MidiDocument::parse(bytes).unwrap();
        assert_eq!(doc.track_count(), 1);
        let mut cursor = doc.cursor(0).unwrap();
        assert!(cursor.next_event().unwrap().is_note_on());
    }

    #[test]
    fn test_skips_unknown_chunk_by_scanning() {
        let mut bytes = header(0, 1, 96);
        bytes.extend_from_slice(b"XFIH");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        bytes.extend(track(&END_OF_TRACK));

        let doc = MidiDocument::parse(bytes).unwrap();
        assert_eq!(doc.track_span(0).unwrap().len(), 4);
    }

    #[test]
    fn test_unrecoverable_signature_is_corrupted() {
        let mut bytes = header(0, 1, 96);
        bytes.extend_from_slice(b"JUNKJUNKJUNK");
        assert!(matches!(
            MidiDocument::parse(bytes),
            Err(ParseError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_smpte_division() {
        // -25 fps, 40 ticks per frame
        let raw = 0xE728;
        assert_eq!(
            TimeDivision::from_raw(raw),
            TimeDivision::Timecode {
                fps: 25,
                ticks_per_frame: 40
            }
        );
    }

    #[test]
    fn test_nonstandard_header_still_parses() {
        let mut bytes = header(3, 1, 96);
        bytes[4..8].copy_from_slice(&8u32.to_be_bytes());
        bytes.extend(track(&END_OF_TRACK));
        let doc = MidiDocument::parse(bytes).unwrap();
        assert_eq!(doc.format, 3);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            MidiDocument::load_file("/nonexistent/definitely/missing.mid"),
            Err(ParseError::Io(_))
        ));
    }

    #[test]
    fn test_empty_file_is_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mid");
        fs::write(&path, b"").unwrap();
        assert!(matches!(
            MidiDocument::load_file(&path),
            Err(ParseError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_agrees_with_midly() {
        use midly::num::{u15, u28, u4, u7};
        use midly::{Format, Header, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        for t in 0..3u8 {
            smf.tracks.push(vec![
                TrackEvent {
                    delta: u28::new(10 * t as u32),
                    kind: TrackEventKind::Midi {
                        channel: u4::new(t),
                        message: MidiMessage::NoteOn {
                            key: u7::new(60 + t),
                            vel: u7::new(100),
                        },
                    },
                },
                TrackEvent {
                    delta: u28::new(480),
                    kind: TrackEventKind::Midi {
                        channel: u4::new(t),
                        message: MidiMessage::NoteOff {
                            key: u7::new(60 + t),
                            vel: u7::new(0),
                        },
                    },
                },
                TrackEvent {
                    delta: u28::new(0),
                    kind: TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
                },
            ]);
        }
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();

        let doc = MidiDocument::parse(bytes).unwrap();
        assert_eq!(doc.track_count(), 3);
        for (t, cursor) in doc.cursors().into_iter().enumerate() {
            let events: Vec<_> = cursor.collect();
            assert_eq!(events.len(), 3);
            assert!(events[0].is_note_on());
            assert_eq!(events[0].channel as usize, t);
            assert_eq!(events[0].data[0] as usize, 60 + t);
            assert!(events[1].is_note_off());
            assert_eq!(events[1].delta_time, 480);
            assert!(events[2].is_end_of_track());
        }
    }
}
