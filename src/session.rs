//! Render loop state.
//!
//! A [`Session`] ties one [`Orchestrator`] to the renderer and keyboard it
//! drives. Each [`Session::step`] advances playback one frame, draws it, and
//! while recording reads the frame back and sends it to the encoder.

use crate::playback::{
    FrameStatus, Orchestrator, PlaybackClock, PlaybackError, PlaybackState,
};
use crate::render::{clear_background, Keyboard, Renderer};
use crate::video::VideoSettings;
use std::path::Path;

/// What one [`Session::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Playback is not running.
    Idle,
    /// A frame was drawn but not recorded.
    Drawn,
    /// A frame was drawn and sent to the encoder; carries the frame count.
    Recorded(u64),
    /// The song ended. `frames` is the size of the recording, if there was one.
    Finished { frames: u64 },
}

/// Owns playback, drawing and the visual keyboard for one render loop.
#[derive(Debug)]
pub struct Session<R: Renderer, K: Keyboard> {
    orchestrator: Orchestrator,
    renderer: R,
    keyboard: K,
}

impl<R: Renderer, K: Keyboard> Session<R, K> {
    pub fn new(renderer: R, keyboard: K) -> Self {
        Self {
            orchestrator: Orchestrator::new(),
            renderer,
            keyboard,
        }
    }

    /// Loads a MIDI file into the orchestrator.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PlaybackError> {
        self.orchestrator.load_file(path, &mut self.keyboard)
    }

    /// Starts recording from the beginning of the song.
    pub fn start_recording(&mut self, settings: VideoSettings) -> Result<(), PlaybackError> {
        if settings.width != self.renderer.width() || settings.height != self.renderer.height() {
            tracing::warn!(
                "Render target is {}x{} but video is {}x{}; frames will be cropped or padded",
                self.renderer.width(),
                self.renderer.height(),
                settings.width,
                settings.height
            );
        }
        self.orchestrator
            .start_video_output(settings, &mut self.keyboard)
    }

    /// Stops playback and finalizes any recording.
    pub fn stop(&mut self) {
        self.orchestrator.stop(&mut self.keyboard);
    }

    /// Advances one frame.
    ///
    /// # Errors
    ///
    /// Returns the encoder error if a recorded frame cannot be written. The
    /// recording is finalized before returning, and
    /// [`Orchestrator::last_recording_frames`] holds the frames that made it.
    pub fn step(&mut self) -> Result<StepOutcome, PlaybackError> {
        let recording = match self.orchestrator.update(&mut self.keyboard) {
            FrameStatus::Idle => return Ok(StepOutcome::Idle),
            FrameStatus::Finished => {
                return Ok(StepOutcome::Finished {
                    frames: self.orchestrator.last_recording_frames(),
                })
            }
            FrameStatus::Advanced { recording } => recording,
        };

        self.keyboard.update(PlaybackClock::frame_time(1));
        self.draw();
        if !recording {
            return Ok(StepOutcome::Drawn);
        }

        let settings = self.orchestrator.settings();
        let frame = self
            .renderer
            .read_framebuffer(settings.width, settings.height);
        match self.orchestrator.write_frame(&frame) {
            Ok(frames) => Ok(StepOutcome::Recorded(frames)),
            Err(e) => {
                self.orchestrator.stop(&mut self.keyboard);
                tracing::error!(
                    "Recording aborted after {} frames: {}",
                    self.orchestrator.last_recording_frames(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Steps until playback stops.
    ///
    /// Returns the number of frames recorded, or 0 when not recording.
    pub fn run_to_end(&mut self) -> Result<u64, PlaybackError> {
        loop {
            match self.step()? {
                StepOutcome::Idle => return Ok(0),
                StepOutcome::Finished { frames } => return Ok(frames),
                StepOutcome::Drawn | StepOutcome::Recorded(_) => {}
            }
        }
    }

    fn draw(&mut self) {
        clear_background(&mut self.renderer);
        self.keyboard.draw(&mut self.renderer);

        if self.orchestrator.state() == PlaybackState::Recording
            && self.orchestrator.settings().show_debug_info
        {
            if let Some(stats) = self.orchestrator.recording_stats() {
                stats.draw_overlay(&mut self.renderer);
            }
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn keyboard(&self) -> &K {
        &self.keyboard
    }

    /// Mutable access to both collaborators, e.g. for seeking.
    pub fn parts_mut(&mut self) -> (&mut Orchestrator, &mut K) {
        (&mut self.orchestrator, &mut self.keyboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::fixtures::{smf, tempo_track, track};
    use crate::render::{KeyStrip, SoftwareRenderer};

    fn short_song() -> Vec<u8> {
        // Half a second per quarter; note from 0.25s to 0.5s, duration 2.5s
        smf(
            480,
            &[
                tempo_track(&[(0, 500_000)]),
                track(&[(240, 0x90, 72, 100), (480, 0x80, 72, 0)]),
            ],
        )
    }

    fn session() -> Session<SoftwareRenderer, KeyStrip> {
        let mut session = Session::new(SoftwareRenderer::new(64, 36), KeyStrip::new());
        let (orch, keys) = session.parts_mut();
        orch.load_from_memory(short_song(), keys).unwrap();
        session
    }

    #[test]
    fn test_idle_until_played() {
        let mut session = session();
        assert_eq!(session.step().unwrap(), StepOutcome::Idle);
        assert_eq!(session.run_to_end().unwrap(), 0);
    }

    #[test]
    fn test_playback_runs_to_end() {
        let mut session = session();
        session.orchestrator_mut().play();

        let mut drawn = 0;
        loop {
            match session.step().unwrap() {
                StepOutcome::Drawn => drawn += 1,
                StepOutcome::Finished { frames } => {
                    assert_eq!(frames, 0);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(drawn, 149);
        assert!(!session.keyboard().is_pressed(72));
    }

    #[test]
    fn test_seek_through_parts() {
        let mut session = session();
        let (orch, keys) = session.parts_mut();
        orch.seek(0.3, keys).unwrap();
        assert!(session.keyboard().is_pressed(72));
    }

    #[cfg(unix)]
    mod recording {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_recording_writes_every_frame() {
            let dir = tempfile::tempdir().unwrap();
            let output = dir.path().join("song.raw");
            let settings = VideoSettings {
                width: 64,
                height: 36,
                ffmpeg_executable_path: fake_encoder(
                    dir.path(),
                    r#"for last; do :; done; cat > "$last""#,
                ),
                output_path: output.clone(),
                show_debug_info: true,
                ..VideoSettings::default()
            };

            let mut session = session();
            session.start_recording(settings).unwrap();
            let frames = session.run_to_end().unwrap();

            assert_eq!(frames, 149);
            let bytes = fs::read(&output).unwrap();
            assert_eq!(bytes.len(), 149 * 64 * 36 * 4);
            assert!(!session.orchestrator().is_recording());
        }

        #[test]
        fn test_write_failure_aborts_recording() {
            let dir = tempfile::tempdir().unwrap();
            let settings = VideoSettings {
                width: 256,
                height: 256,
                ffmpeg_executable_path: fake_encoder(dir.path(), "exit 0"),
                ..VideoSettings::default()
            };

            let mut session = Session::new(SoftwareRenderer::new(256, 256), KeyStrip::new());
            let (orch, keys) = session.parts_mut();
            orch.load_from_memory(short_song(), keys).unwrap();
            session.start_recording(settings).unwrap();

            let err = session.run_to_end().unwrap_err();
            assert!(matches!(err, PlaybackError::Encoder(_)));
            assert!(!session.orchestrator().is_recording());
            assert_eq!(session.orchestrator().state(), PlaybackState::Stopped);
            assert!(session.orchestrator().last_recording_frames() < 149);
        }
    }
}
