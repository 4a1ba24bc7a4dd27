//! Decoded MIDI track events.
//!
//! A [`RawEvent`] is exactly what the tokenizer pulled out of the byte
//! stream: the delta time, the category derived from the status byte, and
//! the data bytes or payload that followed it.

/// Meta event type: end of track.
pub const META_END_OF_TRACK: u8 = 0x2F;

/// Meta event type: set tempo (3-byte microseconds per quarter note).
pub const META_SET_TEMPO: u8 = 0x51;

/// Meta event type: track name.
pub const META_TRACK_NAME: u8 = 0x03;

/// Category of a decoded event, derived from its status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    NoteOff,
    NoteOn,
    PolyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    /// Status 0xFF.
    Meta,
    /// Status 0xF0 or 0xF7.
    Sysex,
    /// System common / realtime status (0xF1-0xFE except 0xF7), carrying the raw status byte.
    System(u8),
}

impl EventKind {
    /// Maps a status byte to its event category.
    pub fn from_status(status: u8) -> Self {
        match status {
            0xFF => EventKind::Meta,
            0xF0 | 0xF7 => EventKind::Sysex,
            0xF1..=0xFE => EventKind::System(status),
            _ => match status & 0xF0 {
                0x80 => EventKind::NoteOff,
                0x90 => EventKind::NoteOn,
                0xA0 => EventKind::PolyPressure,
                0xB0 => EventKind::ControlChange,
                0xC0 => EventKind::ProgramChange,
                0xD0 => EventKind::ChannelPressure,
                // Only 0xE0 remains once the running-status byte has its high bit set.
                _ => EventKind::PitchBend,
            },
        }
    }

    /// Number of data bytes following the status byte of a channel or system message.
    pub fn data_len(self) -> usize {
        match self {
            EventKind::ProgramChange | EventKind::ChannelPressure => 1,
            EventKind::System(0xF1) | EventKind::System(0xF3) => 1,
            EventKind::System(0xF2) => 2,
            EventKind::System(_) | EventKind::Meta | EventKind::Sysex => 0,
            _ => 2,
        }
    }

    /// Whether this is a channel voice message.
    pub fn is_channel_message(self) -> bool {
        !matches!(
            self,
            EventKind::Meta | EventKind::Sysex | EventKind::System(_)
        )
    }
}

/// One event decoded from a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Ticks since the previous event in the same track.
    pub delta_time: u32,
    pub kind: EventKind,
    /// Channel (0-15) for channel messages, 0 otherwise.
    pub channel: u8,
    /// First and second data byte; unused bytes are 0.
    pub data: [u8; 2],
    /// Meta type byte (Meta only).
    pub meta_type: Option<u8>,
    /// Meta or sysex payload.
    pub payload: Vec<u8>,
}

impl RawEvent {
    /// Note-On with non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.kind == EventKind::NoteOn && self.data[1] > 0
    }

    /// Note-Off, or Note-On with velocity 0.
    pub fn is_note_off(&self) -> bool {
        self.kind == EventKind::NoteOff || (self.kind == EventKind::NoteOn && self.data[1] == 0)
    }

    /// Whether the event drives the keyboard.
    pub fn is_note_event(&self) -> bool {
        matches!(self.kind, EventKind::NoteOn | EventKind::NoteOff)
    }

    /// Returns the tempo in microseconds per quarter note if this is a well-formed SetTempo.
    pub fn tempo(&self) -> Option<u32> {
        if self.kind != EventKind::Meta || self.meta_type != Some(META_SET_TEMPO) {
            return None;
        }
        match self.payload.as_slice() {
            [a, b, c] => Some((*a as u32) << 16 | (*b as u32) << 8 | *c as u32),
            _ => None,
        }
    }

    /// Whether this is the end-of-track meta event.
    pub fn is_end_of_track(&self) -> bool {
        self.kind == EventKind::Meta && self.meta_type == Some(META_END_OF_TRACK)
    }

    /// Converts a note event into its compact scheduled form.
    pub fn note_event(&self) -> Option<NoteEvent> {
        if !self.is_note_event() {
            return None;
        }
        Some(NoteEvent {
            channel: self.channel,
            note: self.data[0],
            velocity: self.data[1],
            on: self.is_note_on(),
        })
    }
}

/// A note event as held in the scheduler's lookahead buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// True for Note-On with velocity > 0.
    pub on: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_status() {
        assert_eq!(EventKind::from_status(0x91), EventKind::NoteOn);
        assert_eq!(EventKind::from_status(0x8F), EventKind::NoteOff);
        assert_eq!(EventKind::from_status(0xC3), EventKind::ProgramChange);
        assert_eq!(EventKind::from_status(0xE0), EventKind::PitchBend);
        assert_eq!(EventKind::from_status(0xFF), EventKind::Meta);
        assert_eq!(EventKind::from_status(0xF7), EventKind::Sysex);
        assert_eq!(EventKind::from_status(0xF8), EventKind::System(0xF8));
    }

    #[test]
    fn test_data_len() {
        assert_eq!(EventKind::ProgramChange.data_len(), 1);
        assert_eq!(EventKind::ChannelPressure.data_len(), 1);
        assert_eq!(EventKind::ControlChange.data_len(), 2);
        assert_eq!(EventKind::System(0xF2).data_len(), 2);
        assert_eq!(EventKind::System(0xFA).data_len(), 0);
    }

    #[test]
    fn test_note_off_by_zero_velocity() {
        let event = RawEvent {
            delta_time: 0,
            kind: EventKind::NoteOn,
            channel: 2,
            data: [60, 0],
            meta_type: None,
            payload: Vec::new(),
        };
        assert!(event.is_note_off());
        assert!(!event.is_note_on());
        let note = event.note_event().unwrap();
        assert!(!note.on);
        assert_eq!(note.channel, 2);
    }

    #[test]
    fn test_tempo_requires_three_bytes() {
        let mut event = RawEvent {
            delta_time: 0,
            kind: EventKind::Meta,
            channel: 0,
            data: [0, 0],
            meta_type: Some(META_SET_TEMPO),
            payload: vec![0x07, 0xA1, 0x20],
        };
        assert_eq!(event.tempo(), Some(500_000));
        event.payload.pop();
        assert_eq!(event.tempo(), None);
    }
}
