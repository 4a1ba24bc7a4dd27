//! Streaming multi-track event scheduler.
//!
//! Each track keeps a one-event lookahead buffer, and a min-priority queue
//! holds at most one pending entry per track. Popping the earliest entry and
//! refilling that track's buffer merges N tick-ordered streams into one
//! time-ordered stream in O(log N) per event, without materializing the
//! event list.

use super::tempo_map::TempoMap;
use crate::midi::{MidiDocument, NoteEvent, TrackCursor};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Tolerance for comparing independently computed event times.
///
/// Simultaneous notes in different tracks go through separate float
/// computations; anything within this window of the target is due.
pub const TIME_EPSILON: f64 = 1e-6;

/// A note event with its resolved position in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub track_index: usize,
    pub tick: u32,
    pub time_seconds: f64,
    pub event: NoteEvent,
}

/// Priority-queue entry: the head of one track's stream.
#[derive(Debug, Clone, Copy)]
pub struct PendingEvent {
    pub track_index: usize,
    pub time_seconds: f64,
    pub tick: u32,
    /// Push order, used only to make exact ties reproducible.
    sequence: u64,
}

impl PendingEvent {
    fn key_cmp(&self, other: &Self) -> Ordering {
        self.time_seconds
            .total_cmp(&other.time_seconds)
            .then(self.tick.cmp(&other.tick))
            .then(self.sequence.cmp(&other.sequence))
    }
}

// For BinaryHeap - we want minimum (time, tick) first
impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingEvent {}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key_cmp(self)
    }
}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct TrackLane {
    cursor: TrackCursor,
    buffered: Option<ScheduledNote>,
}

/// K-way merge over all tracks of a document.
#[derive(Debug)]
pub struct EventScheduler {
    document: MidiDocument,
    tempo_map: Arc<TempoMap>,
    lanes: Vec<TrackLane>,
    pending: BinaryHeap<PendingEvent>,
    next_sequence: u64,
    processed: usize,
}

impl EventScheduler {
    /// Creates a scheduler positioned at the start of the song.
    pub fn new(document: MidiDocument, tempo_map: Arc<TempoMap>) -> Self {
        let mut scheduler = Self {
            document,
            tempo_map,
            lanes: Vec::new(),
            pending: BinaryHeap::new(),
            next_sequence: 0,
            processed: 0,
        };
        scheduler.reset();
        scheduler
    }

    /// Rebuilds every cursor, empties the queue and primes each track's lookahead.
    pub fn reset(&mut self) {
        self.lanes = self
            .document
            .cursors()
            .into_iter()
            .map(|cursor| TrackLane {
                cursor,
                buffered: None,
            })
            .collect();
        self.pending = BinaryHeap::with_capacity(self.lanes.len());
        self.next_sequence = 0;
        self.processed = 0;

        for track_index in 0..self.lanes.len() {
            self.load_next_track_event(track_index);
        }
    }

    /// Advances one track to its next note event and queues it.
    ///
    /// Returns false when the track has no further note events; it then
    /// drops out of scheduling.
    fn load_next_track_event(&mut self, track_index: usize) -> bool {
        let Some(lane) = self.lanes.get_mut(track_index) else {
            return false;
        };
        lane.buffered = None;

        while let Some(event) = lane.cursor.next_event() {
            let Some(note) = event.note_event() else {
                continue;
            };
            let tick = lane.cursor.tick();
            let time_seconds = self.tempo_map.elapsed_seconds(tick);
            lane.buffered = Some(ScheduledNote {
                track_index,
                tick,
                time_seconds,
                event: note,
            });

            self.pending.push(PendingEvent {
                track_index,
                time_seconds,
                tick,
                sequence: self.next_sequence,
            });
            self.next_sequence += 1;
            return true;
        }

        false
    }

    /// Pops every event due at or before `time` (within [`TIME_EPSILON`]) in
    /// time order, handing each to `apply`.
    ///
    /// Returns the number of events applied.
    pub fn drain_until<F>(&mut self, time: f64, mut apply: F) -> usize
    where
        F: FnMut(&ScheduledNote),
    {
        let mut applied = 0;

        while let Some(next) = self.pending.peek().copied() {
            if next.time_seconds > time + TIME_EPSILON {
                break;
            }
            self.pending.pop();

            let Some(lane) = self.lanes.get_mut(next.track_index) else {
                continue;
            };
            let Some(note) = lane.buffered else {
                continue;
            };
            if note.tick != next.tick || (note.time_seconds - next.time_seconds).abs() > TIME_EPSILON
            {
                tracing::trace!("Dropping stale entry for track {}", next.track_index);
                continue;
            }

            apply(&note);
            applied += 1;
            self.processed += 1;

            self.load_next_track_event(next.track_index);
        }

        applied
    }

    /// Time of the earliest pending event.
    pub fn next_event_time(&self) -> Option<f64> {
        self.pending.peek().map(|next| next.time_seconds)
    }

    /// Whether every track has been fully consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of entries in the priority queue; never more than the track count.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Events applied since the last reset.
    pub fn processed_count(&self) -> usize {
        self.processed
    }

    /// The tempo map event times are resolved against.
    pub fn tempo_map(&self) -> &TempoMap {
        &self.tempo_map
    }
}
