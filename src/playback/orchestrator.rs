//! Playback state machine.
//!
//! The [`Orchestrator`] owns the loaded document, its tempo map and
//! scheduler, the virtual clock, the active-note table and the encoder
//! handle. A render loop calls [`Orchestrator::update`] once per produced
//! frame and, while recording, hands the captured frame back through
//! [`Orchestrator::write_frame`].

use super::clock::{PlaybackClock, CLOCK_RATE};
use super::error::PlaybackError;
use super::scheduler::{EventScheduler, ScheduledNote};
use super::tempo_map::{ScanStats, TempoMap};
use crate::midi::{note_to_name, MidiDocument, NoteEvent, TimeDivision, NOTE_COUNT};
use crate::render::{palette_color, Color, Keyboard};
use crate::video::{ColorMode, EncoderPipe, RecordingStats, VideoSettings};
use std::path::Path;
use std::sync::Arc;

/// Silence appended after the last note.
pub const TAIL_SECONDS: f64 = 2.0;

/// Frames between progress log lines while recording.
const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Current playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    /// Playing with an encoder attached.
    Recording,
}

/// Outcome of one [`Orchestrator::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Not playing; the clock did not move.
    Idle,
    /// The clock advanced one frame. `recording` is true when the caller
    /// should capture and submit this frame.
    Advanced { recording: bool },
    /// The end of the song was reached and playback stopped.
    Finished,
}

/// Notifications sent to the frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// A frame was written; carries the running frame count.
    Captured(u64),
    /// The recording ended after this many frames.
    Finished(u64),
}

type ProgressCallback = Box<dyn FnMut(f32)>;
type FrameCallback = Box<dyn FnMut(FrameEvent)>;

#[derive(Debug)]
struct LoadedSong {
    document: MidiDocument,
    tempo_map: Arc<TempoMap>,
    stats: ScanStats,
    scheduler: EventScheduler,
    total_duration: f64,
}

/// Plays a MIDI document against a [`Keyboard`] and optionally records it.
pub struct Orchestrator {
    state: PlaybackState,
    song: Option<LoadedSong>,
    clock: PlaybackClock,
    active_notes: [bool; NOTE_COUNT],
    settings: VideoSettings,
    encoder: Option<EncoderPipe>,
    recording_stats: Option<RecordingStats>,
    last_recording_frames: u64,
    progress_callback: Option<ProgressCallback>,
    frame_callback: Option<FrameCallback>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state)
            .field("song", &self.song)
            .field("clock", &self.clock)
            .field("recording", &self.encoder.is_some())
            .finish_non_exhaustive()
    }
}

/// Color of the blip for a note, per the configured mode.
fn blip_color(mode: ColorMode, channel: u8, track_index: usize) -> Color {
    match mode {
        ColorMode::Channel => palette_color(channel as usize),
        ColorMode::Track => palette_color(track_index),
        ColorMode::Both => palette_color(channel as usize).average(palette_color(track_index)),
    }
}

/// Releases every key and drops blips still animating.
fn release_all(keyboard: &mut dyn Keyboard) {
    for note in 0..NOTE_COUNT as u8 {
        keyboard.set_key_pressed(note, false);
    }
    keyboard.clear_blips();
}

/// Applies one scheduled note to the note table and the keyboard.
fn apply_note(
    note: &ScheduledNote,
    color_mode: ColorMode,
    active_notes: &mut [bool; NOTE_COUNT],
    keyboard: &mut dyn Keyboard,
) {
    let NoteEvent {
        channel,
        note: key,
        on,
        ..
    } = note.event;
    let Some(slot) = active_notes.get_mut(key as usize) else {
        return;
    };
    *slot = on;
    keyboard.set_key_pressed(key, on);
    if on {
        keyboard.add_blip(key, blip_color(color_mode, channel, note.track_index));
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            song: None,
            clock: PlaybackClock::new(),
            active_notes: [false; NOTE_COUNT],
            settings: VideoSettings::default(),
            encoder: None,
            recording_stats: None,
            last_recording_frames: 0,
            progress_callback: None,
            frame_callback: None,
        }
    }

    /// Loads a MIDI file, replacing any loaded document.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Load` if the file cannot be read or its
    /// header is invalid. The previous document is unloaded either way.
    pub fn load_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        keyboard: &mut dyn Keyboard,
    ) -> Result<(), PlaybackError> {
        self.unload(keyboard);
        let document = MidiDocument::load_file(path.as_ref())?;
        tracing::info!("Loaded MIDI file: {}", path.as_ref().display());
        self.install(document);
        Ok(())
    }

    /// Loads a MIDI document from bytes already in memory.
    pub fn load_from_memory(
        &mut self,
        bytes: impl Into<Arc<[u8]>>,
        keyboard: &mut dyn Keyboard,
    ) -> Result<(), PlaybackError> {
        self.unload(keyboard);
        let document = MidiDocument::parse(bytes)?;
        self.install(document);
        Ok(())
    }

    fn install(&mut self, document: MidiDocument) {
        let (tempo_map, stats) = TempoMap::build(&document);
        let total_duration = tempo_map.elapsed_seconds(stats.last_note_tick) + TAIL_SECONDS;
        let tempo_map = Arc::new(tempo_map);
        let scheduler = EventScheduler::new(document.clone(), Arc::clone(&tempo_map));

        let division = match document.time_division() {
            TimeDivision::Metrical(tpq) => format!("{} ticks/quarter", tpq),
            TimeDivision::Timecode {
                fps,
                ticks_per_frame,
            } => format!("SMPTE {} fps x {} ticks", fps, ticks_per_frame),
        };
        tracing::info!(
            "MIDI format {}, {} tracks, {}, {} tempo changes",
            document.format,
            document.track_count(),
            division,
            tempo_map.changes().len()
        );
        tracing::info!(
            "{} note events ({} note-ons), duration {:.2}s",
            stats.note_event_count,
            stats.note_on_count,
            total_duration
        );

        self.song = Some(LoadedSong {
            document,
            tempo_map,
            stats,
            scheduler,
            total_duration,
        });
        self.clock.reset();
        self.active_notes = [false; NOTE_COUNT];
        self.state = PlaybackState::Stopped;
    }

    /// Drops the loaded document, finalizing any recording first.
    ///
    /// Every key on `keyboard` is released.
    pub fn unload(&mut self, keyboard: &mut dyn Keyboard) {
        self.finish_recording();
        release_all(keyboard);
        self.song = None;
        self.clock.reset();
        self.active_notes = [false; NOTE_COUNT];
        self.state = PlaybackState::Stopped;
    }

    pub fn is_loaded(&self) -> bool {
        self.song.is_some()
    }

    /// Starts or resumes playback.
    ///
    /// From `Stopped` playback restarts at frame 0; from `Paused` it resumes
    /// where it left off. Other states are left alone.
    pub fn play(&mut self) {
        let Some(song) = self.song.as_mut() else {
            tracing::warn!("Cannot play: no MIDI file loaded");
            return;
        };
        match self.state {
            PlaybackState::Stopped => {
                self.clock.reset();
                song.scheduler.reset();
                self.state = PlaybackState::Playing;
                tracing::info!("Playback started");
            }
            PlaybackState::Paused => {
                self.state = PlaybackState::Playing;
                tracing::info!("Playback resumed at {:.3}s", self.clock.current_time());
            }
            PlaybackState::Playing | PlaybackState::Recording => {}
        }
    }

    /// Pauses playback. Only has an effect while `Playing`.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
            tracing::info!("Playback paused at {:.3}s", self.clock.current_time());
        }
    }

    /// Stops playback, releasing every key and rewinding to the start.
    ///
    /// An active recording is finalized.
    pub fn stop(&mut self, keyboard: &mut dyn Keyboard) {
        self.finish_recording();

        release_all(keyboard);
        self.active_notes = [false; NOTE_COUNT];
        self.clock.reset();
        if let Some(song) = self.song.as_mut() {
            song.scheduler.reset();
        }
        if self.state != PlaybackState::Stopped {
            tracing::info!("Playback stopped");
        }
        self.state = PlaybackState::Stopped;
    }

    /// Jumps to `time_seconds`, clamped to the song length.
    ///
    /// Replays every note event up to the target into a scratch table and
    /// then pushes the resulting key state to `keyboard` in one batch, so
    /// the outcome matches playing forward from the start. Held keys get
    /// the color of their last note-on and blips are cleared. Seeking while
    /// stopped leaves playback paused at the target.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::NoDocument` when nothing is loaded.
    pub fn seek(
        &mut self,
        time_seconds: f64,
        keyboard: &mut dyn Keyboard,
    ) -> Result<(), PlaybackError> {
        let song = self.song.as_mut().ok_or(PlaybackError::NoDocument)?;
        let target = time_seconds.clamp(0.0, song.total_duration);

        song.scheduler.reset();
        // Held keys keep the color of the note-on that pressed them.
        let color_mode = self.settings.color_mode;
        let mut held: [Option<Color>; NOTE_COUNT] = [None; NOTE_COUNT];
        song.scheduler.drain_until(target, |note| {
            if let Some(slot) = held.get_mut(note.event.note as usize) {
                *slot = note
                    .event
                    .on
                    .then(|| blip_color(color_mode, note.event.channel, note.track_index));
            }
        });

        keyboard.clear_blips();
        for (note, color) in held.iter().enumerate() {
            keyboard.set_key_pressed(note as u8, color.is_some());
            if let Some(color) = color {
                keyboard.set_key_color(note as u8, *color);
            }
        }
        self.active_notes = held.map(|color| color.is_some());
        self.clock.seek_to(target);
        if self.state == PlaybackState::Stopped {
            self.state = PlaybackState::Paused;
        }

        tracing::debug!(
            "Seeked to {:.3}s ({} notes held)",
            target,
            self.active_note_count()
        );
        Ok(())
    }

    /// Applies every event due at or before `current_time`.
    ///
    /// Returns the number of events applied.
    pub fn process_events(&mut self, current_time: f64, keyboard: &mut dyn Keyboard) -> usize {
        let Some(song) = self.song.as_mut() else {
            return 0;
        };
        let color_mode = self.settings.color_mode;
        let active_notes = &mut self.active_notes;
        song.scheduler.drain_until(current_time, |note| {
            tracing::trace!(
                "{:.3}s track {} ch {} {} {}",
                note.time_seconds,
                note.track_index,
                note.event.channel,
                note_to_name(note.event.note & 0x7F),
                if note.event.on { "on" } else { "off" }
            );
            apply_note(note, color_mode, active_notes, keyboard);
        })
    }

    /// Advances the clock by one frame and applies the due events.
    ///
    /// Time moves in fixed 1/60 s steps regardless of how long the previous
    /// frame took. Reaching the end of the song stops playback and finalizes
    /// any recording.
    pub fn update(&mut self, keyboard: &mut dyn Keyboard) -> FrameStatus {
        if !matches!(
            self.state,
            PlaybackState::Playing | PlaybackState::Recording
        ) {
            return FrameStatus::Idle;
        }
        let Some(total_duration) = self.song.as_ref().map(|song| song.total_duration) else {
            return FrameStatus::Idle;
        };

        let current_time = self.clock.tick();
        if current_time >= total_duration {
            tracing::info!("Reached end of song at {:.3}s", current_time);
            self.stop(keyboard);
            return FrameStatus::Finished;
        }

        self.process_events(current_time, keyboard);

        let progress = self.progress();
        if let Some(callback) = self.progress_callback.as_mut() {
            callback(progress);
        }

        FrameStatus::Advanced {
            recording: self.state == PlaybackState::Recording,
        }
    }

    /// Spawns the encoder and restarts playback from the beginning in
    /// `Recording` state.
    ///
    /// # Errors
    ///
    /// Fails when nothing is loaded, a recording is already running, or the
    /// encoder cannot be started (including a missing audio file, which is
    /// checked before anything is spawned).
    pub fn start_video_output(
        &mut self,
        settings: VideoSettings,
        keyboard: &mut dyn Keyboard,
    ) -> Result<(), PlaybackError> {
        if self.song.is_none() {
            tracing::error!("Cannot start video output: no MIDI file loaded");
            return Err(PlaybackError::NoDocument);
        }
        if self.encoder.is_some() {
            tracing::error!("Video output already in progress");
            return Err(PlaybackError::AlreadyRecording);
        }
        if settings.fps != CLOCK_RATE {
            tracing::warn!(
                "Encoder frame rate is {} fps but playback advances at {} fps; output will play at {:.2}x",
                settings.fps,
                CLOCK_RATE,
                settings.fps as f64 / CLOCK_RATE as f64
            );
        }

        let encoder = EncoderPipe::start(&settings)?;
        tracing::info!(
            "Video output started: {} ({}x{}, {} fps, {} bps, {}, colors by {})",
            encoder.output_path().display(),
            settings.width,
            settings.height,
            settings.fps,
            settings.bitrate,
            if settings.use_cbr { "CBR" } else { "VBR" },
            settings.color_mode
        );
        if settings.include_audio {
            tracing::info!(
                "Audio: {} (aac, {} bps)",
                settings.audio_file_path.display(),
                settings.audio_bitrate
            );
        }

        self.stop(keyboard);
        let total_duration = self.total_duration();
        self.settings = settings;
        self.encoder = Some(encoder);
        self.recording_stats = Some(RecordingStats::new(total_duration));
        self.last_recording_frames = 0;
        self.state = PlaybackState::Recording;
        Ok(())
    }

    /// Finalizes the recording and stops playback.
    ///
    /// Returns the number of frames written.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::NotRecording` if no recording is active.
    pub fn stop_video_output(&mut self, keyboard: &mut dyn Keyboard) -> Result<u64, PlaybackError> {
        if self.encoder.is_none() {
            return Err(PlaybackError::NotRecording);
        }
        self.stop(keyboard);
        Ok(self.last_recording_frames)
    }

    fn finish_recording(&mut self) {
        let Some(encoder) = self.encoder.take() else {
            return;
        };
        let frames = encoder.frames_written();
        let output = encoder.output_path().to_path_buf();
        encoder.finish();
        tracing::info!(
            "Video output stopped. Captured {} frames to {}",
            frames,
            output.display()
        );

        self.last_recording_frames = frames;
        self.recording_stats = None;
        if let Some(callback) = self.frame_callback.as_mut() {
            callback(FrameEvent::Finished(frames));
        }
    }

    /// Sends one captured frame to the encoder.
    ///
    /// Returns the number of frames written so far.
    ///
    /// # Errors
    ///
    /// Fails with `NotRecording` when no encoder is attached, or with the
    /// encoder's error when the frame has the wrong size or cannot be
    /// written. The caller is expected to abort the recording on failure.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<u64, PlaybackError> {
        let progress = self.progress();
        let encoder = self.encoder.as_mut().ok_or(PlaybackError::NotRecording)?;
        encoder.write_frame(frame)?;
        let frames = encoder.frames_written();

        if let Some(stats) = self.recording_stats.as_mut() {
            stats.update(frames, progress as f64);
        }
        if frames % PROGRESS_LOG_INTERVAL == 0 {
            tracing::info!(
                "Captured {} frames ({:.1}%)",
                frames,
                progress * 100.0
            );
        }
        if let Some(callback) = self.frame_callback.as_mut() {
            callback(FrameEvent::Captured(frames));
        }
        Ok(frames)
    }

    /// Called with the playback progress (0.0 to 1.0) after each advancing update.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: FnMut(f32) + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    /// Called after each written frame and when a recording finishes.
    pub fn set_frame_callback<F>(&mut self, callback: F)
    where
        F: FnMut(FrameEvent) + 'static,
    {
        self.frame_callback = Some(Box::new(callback));
    }

    /// Every note event with `start <= time <= end`, sorted by time then tick.
    ///
    /// Reads the document with fresh cursors, so playback position is not
    /// affected.
    pub fn events_in_range(&self, start: f64, end: f64) -> Vec<ScheduledNote> {
        let Some(song) = self.song.as_ref() else {
            return Vec::new();
        };
        if end < start {
            return Vec::new();
        }

        let mut events = Vec::new();
        for mut cursor in song.document.cursors() {
            while let Some(event) = cursor.next_event() {
                let Some(note) = event.note_event() else {
                    continue;
                };
                let tick = cursor.tick();
                let time_seconds = song.tempo_map.elapsed_seconds(tick);
                if time_seconds > end {
                    // Ticks only grow within a track.
                    break;
                }
                if time_seconds >= start {
                    events.push(ScheduledNote {
                        track_index: cursor.track_index(),
                        tick,
                        time_seconds,
                        event: note,
                    });
                }
            }
        }
        events.sort_by(|a, b| {
            a.time_seconds
                .total_cmp(&b.time_seconds)
                .then(a.tick.cmp(&b.tick))
        });
        events
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.encoder.is_some()
    }

    /// Current position in seconds.
    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    /// Frames advanced since playback started.
    pub fn current_frame(&self) -> u64 {
        self.clock.frame()
    }

    /// Song length including the tail, or 0 when nothing is loaded.
    pub fn total_duration(&self) -> f64 {
        self.song.as_ref().map_or(0.0, |song| song.total_duration)
    }

    /// Playback progress from 0.0 to 1.0.
    pub fn progress(&self) -> f32 {
        let total = self.total_duration();
        if total <= 0.0 {
            return 0.0;
        }
        (self.current_time() / total).clamp(0.0, 1.0) as f32
    }

    /// Note-On events (velocity > 0) in the document.
    pub fn total_note_count(&self) -> usize {
        self.song.as_ref().map_or(0, |song| song.stats.note_on_count)
    }

    /// Note events of any kind in the document.
    pub fn total_event_count(&self) -> usize {
        self.song
            .as_ref()
            .map_or(0, |song| song.stats.note_event_count)
    }

    /// Keys currently held.
    pub fn active_note_count(&self) -> usize {
        self.active_notes.iter().filter(|&&on| on).count()
    }

    /// The held-key table indexed by note number.
    pub fn active_notes(&self) -> &[bool; NOTE_COUNT] {
        &self.active_notes
    }

    /// Events applied since the last reset.
    pub fn processed_event_count(&self) -> usize {
        self.song
            .as_ref()
            .map_or(0, |song| song.scheduler.processed_count())
    }

    pub fn document(&self) -> Option<&MidiDocument> {
        self.song.as_ref().map(|song| &song.document)
    }

    pub fn tempo_map(&self) -> Option<&TempoMap> {
        self.song.as_ref().map(|song| song.tempo_map.as_ref())
    }

    pub fn scan_stats(&self) -> Option<ScanStats> {
        self.song.as_ref().map(|song| song.stats)
    }

    pub fn settings(&self) -> &VideoSettings {
        &self.settings
    }

    /// Replaces the settings used for coloring. Ignored while recording.
    pub fn set_settings(&mut self, settings: VideoSettings) {
        if self.encoder.is_some() {
            tracing::warn!("Cannot change video settings while recording");
            return;
        }
        self.settings = settings;
    }

    /// Throughput of the active recording.
    pub fn recording_stats(&self) -> Option<&RecordingStats> {
        self.recording_stats.as_ref()
    }

    /// Frames written by the most recently finished recording.
    pub fn last_recording_frames(&self) -> u64 {
        self.last_recording_frames
    }
}
