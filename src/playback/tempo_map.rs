//! Tempo map and the load-time pre-scan that builds it.
//!
//! The pre-scan walks every track once with throwaway cursors, collecting
//! SetTempo events and note statistics. The resulting [`TempoMap`] converts
//! absolute ticks to seconds for the rest of the session.

use crate::midi::{ticks_to_seconds, MidiDocument, TrackCursor, DEFAULT_TEMPO_US};
use rayon::prelude::*;

/// A tempo change at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u32,
    /// Microseconds per quarter note.
    pub tempo: u32,
}

/// Statistics gathered by the pre-scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Note-On (any velocity) and Note-Off events.
    pub note_event_count: usize,
    /// Note-On events with velocity > 0.
    pub note_on_count: usize,
    /// Highest tick of any note event.
    pub last_note_tick: u32,
    /// Highest tick reached by any event in any track.
    pub max_tick: u32,
}

#[derive(Debug, Default)]
struct TrackScan {
    tempo_changes: Vec<TempoChange>,
    stats: ScanStats,
}

fn scan_track(cursor: TrackCursor) -> TrackScan {
    let mut scan = TrackScan::default();
    let mut cursor = cursor;

    while let Some(event) = cursor.next_event() {
        let tick = cursor.tick();
        scan.stats.max_tick = scan.stats.max_tick.max(tick);

        if let Some(tempo) = event.tempo() {
            if tempo == 0 {
                tracing::debug!(
                    "Ignoring zero tempo in track {} at tick {}",
                    cursor.track_index(),
                    tick
                );
            } else {
                scan.tempo_changes.push(TempoChange { tick, tempo });
            }
        }

        if event.is_note_event() {
            scan.stats.note_event_count += 1;
            if event.is_note_on() {
                scan.stats.note_on_count += 1;
            }
            scan.stats.last_note_tick = scan.stats.last_note_tick.max(tick);
        }
    }

    scan
}

/// Sorted tempo changes with a precomputed start time for each segment.
///
/// Always holds an entry at tick 0.
#[derive(Debug, Clone)]
pub struct TempoMap {
    division: u16,
    changes: Vec<TempoChange>,
    /// Seconds elapsed at the start of each entry in `changes`.
    segment_starts: Vec<f64>,
}

impl TempoMap {
    /// Builds a tempo map from unsorted changes.
    ///
    /// Changes are sorted by tick (stable, so later entries at the same tick
    /// win) and a 120 BPM entry is prepended when nothing starts at tick 0.
    pub fn new(division: u16, mut changes: Vec<TempoChange>) -> Self {
        changes.sort_by_key(|change| change.tick);
        if changes.first().is_none_or(|first| first.tick > 0) {
            changes.insert(
                0,
                TempoChange {
                    tick: 0,
                    tempo: DEFAULT_TEMPO_US,
                },
            );
        }

        let mut segment_starts = Vec::with_capacity(changes.len());
        let mut elapsed = 0.0;
        segment_starts.push(elapsed);
        for pair in changes.windows(2) {
            elapsed += ticks_to_seconds(pair[1].tick - pair[0].tick, division, pair[0].tempo);
            segment_starts.push(elapsed);
        }

        Self {
            division,
            changes,
            segment_starts,
        }
    }

    /// Runs the pre-scan over every track of `doc` and builds the tempo map.
    ///
    /// Tracks are scanned in parallel; their results are merged in track
    /// order so the outcome does not depend on scheduling.
    pub fn build(doc: &MidiDocument) -> (Self, ScanStats) {
        let scans: Vec<TrackScan> = doc.cursors().into_par_iter().map(scan_track).collect();

        let mut stats = ScanStats::default();
        let mut changes = Vec::new();
        for scan in scans {
            stats.note_event_count += scan.stats.note_event_count;
            stats.note_on_count += scan.stats.note_on_count;
            stats.last_note_tick = stats.last_note_tick.max(scan.stats.last_note_tick);
            stats.max_tick = stats.max_tick.max(scan.stats.max_tick);
            changes.extend(scan.tempo_changes);
        }

        (Self::new(doc.division, changes), stats)
    }

    /// Raw header time division the map converts with.
    pub fn division(&self) -> u16 {
        self.division
    }

    /// Tempo changes in tick order, starting at tick 0.
    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    fn segment_index(&self, tick: u32) -> usize {
        // changes[0].tick == 0, so the partition point is at least 1.
        self.changes.partition_point(|change| change.tick <= tick) - 1
    }

    /// Tempo in effect at `tick`.
    pub fn tempo_at(&self, tick: u32) -> u32 {
        self.changes[self.segment_index(tick)].tempo
    }

    /// Seconds from the start of the song to `target_tick`.
    ///
    /// Piecewise linear over the tempo segments and non-decreasing in
    /// `target_tick`.
    pub fn elapsed_seconds(&self, target_tick: u32) -> f64 {
        let index = self.segment_index(target_tick);
        let change = self.changes[index];
        self.segment_starts[index]
            + ticks_to_seconds(target_tick - change.tick, self.division, change.tempo)
    }
}
