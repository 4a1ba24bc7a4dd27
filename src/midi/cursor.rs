//! Per-track event tokenizer.
//!
//! A [`TrackCursor`] walks one track chunk event by event, keeping the
//! running status and the accumulated absolute tick. Any read that needs
//! more bytes than the chunk has left ends the cursor instead of raising an
//! error, so a damaged track just plays up to the point of damage.

use super::event::{EventKind, RawEvent};
use std::ops::Range;
use std::sync::Arc;

/// Longest legal variable-length quantity in a Standard MIDI File.
const MAX_VLQ_BYTES: usize = 4;

/// Decodes a big-endian variable-length quantity from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// buffer ends mid-quantity or the quantity is longer than four bytes.
pub fn read_variable_length(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;
    for (i, &byte) in bytes.iter().take(MAX_VLQ_BYTES).enumerate() {
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Read position into one track's bytes.
#[derive(Debug, Clone)]
pub struct TrackCursor {
    data: Arc<[u8]>,
    track_index: usize,
    pos: usize,
    end: usize,
    /// Last status byte seen, 0 when none has been established.
    running_status: u8,
    tick: u32,
    ended: bool,
}

impl TrackCursor {
    /// Creates a cursor over `span` of the shared document buffer.
    pub fn new(data: Arc<[u8]>, track_index: usize, span: Range<usize>) -> Self {
        let end = span.end.min(data.len());
        let pos = span.start.min(end);
        Self {
            data,
            track_index,
            pos,
            end,
            running_status: 0,
            tick: 0,
            ended: false,
        }
    }

    /// Index of the track this cursor reads.
    pub fn track_index(&self) -> usize {
        self.track_index
    }

    /// Absolute tick of the most recently decoded event.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Whether the cursor has reached end of track or a truncation point.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Bytes left in the chunk.
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Decodes the next event, advancing the absolute tick by its delta.
    ///
    /// Returns `None` once the track has ended. The end-of-track meta event
    /// itself is returned; the call after it yields `None`.
    pub fn next_event(&mut self) -> Option<RawEvent> {
        if self.ended {
            return None;
        }
        if self.remaining() == 0 {
            return self.finish("end of chunk");
        }

        let Some(delta_time) = self.read_vlq() else {
            return self.finish("truncated delta time");
        };
        self.tick = self.tick.saturating_add(delta_time);

        let Some(&first) = self.data[self.pos..self.end].first() else {
            return self.finish("missing status byte");
        };
        if first & 0x80 != 0 {
            self.running_status = first;
            self.pos += 1;
        } else if self.running_status == 0 {
            return self.finish("data byte without running status");
        }
        let status = self.running_status;

        let kind = EventKind::from_status(status);
        let mut event = RawEvent {
            delta_time,
            kind,
            channel: if kind.is_channel_message() {
                status & 0x0F
            } else {
                0
            },
            data: [0, 0],
            meta_type: None,
            payload: Vec::new(),
        };

        match kind {
            EventKind::Meta => {
                let Some(meta_type) = self.read_u8() else {
                    return self.finish("truncated meta type");
                };
                let Some(payload) = self.read_length_prefixed() else {
                    return self.finish("truncated meta payload");
                };
                event.meta_type = Some(meta_type);
                event.payload = payload;
                if event.is_end_of_track() {
                    self.ended = true;
                }
            }
            EventKind::Sysex => {
                let Some(payload) = self.read_length_prefixed() else {
                    return self.finish("truncated sysex payload");
                };
                event.payload = payload;
            }
            _ => {
                let len = kind.data_len();
                if self.remaining() < len {
                    return self.finish("truncated channel message");
                }
                event.data[..len].copy_from_slice(&self.data[self.pos..self.pos + len]);
                self.pos += len;
            }
        }

        Some(event)
    }

    fn finish(&mut self, reason: &str) -> Option<RawEvent> {
        if self.remaining() > 0 {
            tracing::debug!(
                "Track {} ended at tick {}: {} ({} bytes left)",
                self.track_index,
                self.tick,
                reason,
                self.remaining()
            );
        }
        self.ended = true;
        None
    }

    fn read_u8(&mut self) -> Option<u8> {
        let byte = *self.data[self.pos..self.end].first()?;
        self.pos += 1;
        Some(byte)
    }

    fn read_vlq(&mut self) -> Option<u32> {
        let (value, used) = read_variable_length(&self.data[self.pos..self.end])?;
        self.pos += used;
        Some(value)
    }

    fn read_length_prefixed(&mut self) -> Option<Vec<u8>> {
        let len = self.read_vlq()? as usize;
        if self.remaining() < len {
            return None;
        }
        let payload = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Some(payload)
    }
}

impl Iterator for TrackCursor {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        self.next_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::event::META_SET_TEMPO;

    fn cursor(bytes: &[u8]) -> TrackCursor {
        let data: Arc<[u8]> = Arc::from(bytes);
        let len = data.len();
        TrackCursor::new(data, 0, 0..len)
    }

    #[test]
    fn test_variable_length_values() {
        assert_eq!(read_variable_length(&[0x00]), Some((0, 1)));
        assert_eq!(read_variable_length(&[0x7F]), Some((127, 1)));
        assert_eq!(read_variable_length(&[0x81, 0x00]), Some((128, 2)));
        assert_eq!(read_variable_length(&[0x83, 0x60]), Some((480, 2)));
        assert_eq!(
            read_variable_length(&[0xFF, 0xFF, 0xFF, 0x7F]),
            Some((0x0FFF_FFFF, 4))
        );
    }

    #[test]
    fn test_variable_length_truncated_or_too_long() {
        assert_eq!(read_variable_length(&[]), None);
        assert_eq!(read_variable_length(&[0x81]), None);
        assert_eq!(read_variable_length(&[0x81, 0x81, 0x81, 0x81, 0x00]), None);
    }

    #[test]
    fn test_running_status() {
        // NoteOn ch1 60/100, then running-status NoteOn 64/90 after 96 ticks.
        let mut c = cursor(&[0x00, 0x91, 60, 100, 0x60, 64, 90]);
        let first = c.next_event().unwrap();
        assert_eq!(first.kind, EventKind::NoteOn);
        assert_eq!(first.channel, 1);
        assert_eq!(first.data, [60, 100]);
        let second = c.next_event().unwrap();
        assert_eq!(second.kind, EventKind::NoteOn);
        assert_eq!(second.data, [64, 90]);
        assert_eq!(second.delta_time, 96);
        assert_eq!(c.tick(), 96);
        assert!(c.next_event().is_none());
        assert!(c.is_ended());
    }

    #[test]
    fn test_data_byte_without_running_status_ends_track() {
        let mut c = cursor(&[0x00, 0x40, 0x40]);
        assert!(c.next_event().is_none());
        assert!(c.is_ended());
    }

    #[test]
    fn test_program_change_single_data_byte() {
        let mut c = cursor(&[0x00, 0xC2, 5, 0x00, 0x92, 60, 1]);
        let program = c.next_event().unwrap();
        assert_eq!(program.kind, EventKind::ProgramChange);
        assert_eq!(program.data, [5, 0]);
        let note = c.next_event().unwrap();
        assert_eq!(note.kind, EventKind::NoteOn);
        assert_eq!(note.channel, 2);
    }

    #[test]
    fn test_meta_and_end_of_track() {
        let mut c = cursor(&[
            0x00, 0xFF, META_SET_TEMPO, 0x03, 0x07, 0xA1, 0x20, // tempo
            0x10, 0xFF, 0x2F, 0x00, // end of track
            0x00, 0x90, 60, 100, // never read
        ]);
        let tempo = c.next_event().unwrap();
        assert_eq!(tempo.tempo(), Some(500_000));
        let eot = c.next_event().unwrap();
        assert!(eot.is_end_of_track());
        assert!(c.is_ended());
        assert_eq!(c.tick(), 16);
        assert!(c.next_event().is_none());
    }

    #[test]
    fn test_sysex_payload() {
        let mut c = cursor(&[0x00, 0xF0, 0x03, 0x7E, 0x09, 0xF7, 0x00, 0x80, 60, 0]);
        let sysex = c.next_event().unwrap();
        assert_eq!(sysex.kind, EventKind::Sysex);
        assert_eq!(sysex.payload, vec![0x7E, 0x09, 0xF7]);
        let off = c.next_event().unwrap();
        assert!(off.is_note_off());
    }

    #[test]
    fn test_truncated_meta_payload_ends_track() {
        let mut c = cursor(&[0x00, 0x90, 60, 100, 0x00, 0xFF, 0x01, 0x10, b'a']);
        assert!(c.next_event().is_some());
        assert!(c.next_event().is_none());
        assert!(c.is_ended());
    }

    #[test]
    fn test_truncated_channel_message_ends_track() {
        let mut c = cursor(&[0x00, 0x90, 60]);
        assert!(c.next_event().is_none());
        assert!(c.is_ended());
    }

    #[test]
    fn test_cursor_respects_span() {
        let data: Arc<[u8]> = Arc::from(&[0xAA, 0x00, 0x90, 60, 100, 0xBB][..]);
        let mut c = TrackCursor::new(data, 3, 1..5);
        let note = c.next_event().unwrap();
        assert!(note.is_note_on());
        assert_eq!(c.remaining(), 0);
        assert!(c.next_event().is_none());
        assert_eq!(c.track_index(), 3);
    }
}
