//! External encoder process fed raw frames over stdin.
//!
//! One [`EncoderPipe`] is one recording: the process is spawned by
//! [`EncoderPipe::start`], receives fixed-size RGBA8 frames, and is drained
//! and reaped when the pipe is finished or dropped.

use super::codec::{codec_args, rate_control_args};
use super::settings::VideoSettings;
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use thiserror::Error;

/// Errors raised while starting or feeding the encoder.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("audio is enabled but no audio file path is set")]
    NoAudioPath,

    #[error("audio file not found: {0}")]
    AudioFileMissing(PathBuf),

    #[error("invalid video settings: {0}")]
    InvalidSettings(String),

    #[error("failed to launch encoder {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("frame is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("failed to write frame to encoder: {0}")]
    Write(#[source] io::Error),

    #[error("encoder is not running")]
    NotRunning,
}

/// Checks the audio input before anything is spawned.
///
/// # Errors
///
/// Returns `NoAudioPath` or `AudioFileMissing` when audio is enabled but
/// unusable.
pub fn check_audio(settings: &VideoSettings) -> Result<(), EncoderError> {
    if !settings.include_audio {
        return Ok(());
    }
    if settings.audio_file_path.as_os_str().is_empty() {
        return Err(EncoderError::NoAudioPath);
    }
    if !settings.audio_file_path.is_file() {
        return Err(EncoderError::AudioFileMissing(
            settings.audio_file_path.clone(),
        ));
    }
    Ok(())
}

/// Builds the encoder command line (without the program name).
pub fn build_args(settings: &VideoSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |arg: &str| args.push(OsString::from(arg));

    push("-y");
    push("-f");
    push("rawvideo");
    push("-pixel_format");
    push("rgba");
    push("-video_size");
    push(&format!("{}x{}", settings.width, settings.height));
    push("-framerate");
    push(&settings.fps.to_string());
    push("-i");
    push("pipe:0");

    if settings.include_audio {
        args.push(OsString::from("-i"));
        args.push(settings.audio_file_path.clone().into_os_string());
    }

    args.push(OsString::from("-c:v"));
    args.push(OsString::from(&settings.video_codec));
    args.extend(
        codec_args(&settings.video_codec, settings.use_cbr)
            .into_iter()
            .map(OsString::from),
    );
    args.extend(
        rate_control_args(settings.bitrate, settings.use_cbr)
            .into_iter()
            .map(OsString::from),
    );

    if settings.include_audio {
        let kbps = (settings.audio_bitrate / 1000).max(1);
        for arg in ["-c:a", "aac", "-b:a"] {
            args.push(OsString::from(arg));
        }
        args.push(OsString::from(format!("{}k", kbps)));
        args.push(OsString::from("-shortest"));
    }

    args.push(OsString::from("-pix_fmt"));
    args.push(OsString::from("yuv420p"));
    args.push(settings.output_file().into_os_string());
    args
}

/// A running encoder process.
#[derive(Debug)]
pub struct EncoderPipe {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_size: usize,
    frames_written: u64,
    output_path: PathBuf,
    finished: bool,
}

impl EncoderPipe {
    /// Validates `settings` and launches the encoder.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the audio input is
    /// missing, or the process cannot be spawned. No process is left running
    /// on failure.
    pub fn start(settings: &VideoSettings) -> Result<Self, EncoderError> {
        settings.validate()?;
        check_audio(settings)?;

        if settings.width % 2 != 0 || settings.height % 2 != 0 {
            tracing::warn!(
                "Resolution {}x{} is odd; yuv420p encoders may reject it",
                settings.width,
                settings.height
            );
        }

        let program = settings.ffmpeg_program();
        let args = build_args(settings);
        tracing::info!(
            "Starting encoder: {} {}",
            program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to start encoder {}: {}", program.display(), source);
                EncoderError::Spawn {
                    program: program.clone(),
                    source,
                }
            })?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(EncoderError::Spawn {
                program,
                source: io::Error::other("encoder stdin was not captured"),
            });
        };

        Ok(Self {
            child,
            stdin: Some(stdin),
            frame_size: settings.frame_size(),
            frames_written: 0,
            output_path: settings.output_file(),
            finished: false,
        })
    }

    /// Writes one frame and flushes it.
    ///
    /// Blocks until the encoder has taken the bytes.
    ///
    /// # Errors
    ///
    /// Returns `FrameSize` if `frame` is not exactly `width * height * 4`
    /// bytes, `NotRunning` after the pipe is closed, or `Write` on a short
    /// write or flush failure.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), EncoderError> {
        if frame.len() != self.frame_size {
            return Err(EncoderError::FrameSize {
                expected: self.frame_size,
                actual: frame.len(),
            });
        }
        let stdin = self.stdin.as_mut().ok_or(EncoderError::NotRunning)?;

        stdin
            .write_all(frame)
            .and_then(|_| stdin.flush())
            .map_err(|e| {
                tracing::error!(
                    "Frame write failed after {} frames: {}",
                    self.frames_written,
                    e
                );
                EncoderError::Write(e)
            })?;

        self.frames_written += 1;
        Ok(())
    }

    /// Frames successfully written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Expected length of each frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// File the encoder writes to.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Closes the pipe and waits for the encoder to exit.
    ///
    /// Returns the exit status, or `None` if the process could not be
    /// waited on. A nonzero status is logged but not treated as an error.
    pub fn finish(mut self) -> Option<ExitStatus> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<ExitStatus> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.flush() {
                tracing::debug!("Flush before closing encoder pipe failed: {}", e);
            }
            // Dropping stdin closes the pipe; the encoder sees end of input.
        }

        match self.child.wait() {
            Ok(status) if status.success() => {
                tracing::info!(
                    "Video encoding completed: {} frames written to {}",
                    self.frames_written,
                    self.output_path.display()
                );
                Some(status)
            }
            Ok(status) => {
                tracing::warn!(
                    "Encoder exited with {}; {} may be incomplete",
                    status,
                    self.output_path.display()
                );
                Some(status)
            }
            Err(e) => {
                tracing::error!("Failed to wait for encoder: {}", e);
                None
            }
        }
    }
}

impl Drop for EncoderPipe {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_settings() -> VideoSettings {
        VideoSettings {
            width: 4,
            height: 2,
            ..VideoSettings::default()
        }
    }

    #[test]
    fn test_args_cbr_layout() {
        let settings = VideoSettings {
            output_path: PathBuf::from("out/song"),
            ..VideoSettings::default()
        };
        let args: Vec<String> = build_args(&settings)
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();

        assert_eq!(
            args[..11],
            [
                "-y",
                "-f",
                "rawvideo",
                "-pixel_format",
                "rgba",
                "-video_size",
                "1920x1080",
                "-framerate",
                "60",
                "-i",
                "pipe:0"
            ]
        );
        let at = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[at("-c:v") + 1], "libx264");
        assert_eq!(args[at("-maxrate") + 1], "8000000");
        assert_eq!(args[at("-bufsize") + 1], "16000000");
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(args.last().unwrap(), "out/song.mp4");
    }

    #[test]
    fn test_args_vbr_with_audio() {
        let settings = VideoSettings {
            use_cbr: false,
            include_audio: true,
            audio_file_path: PathBuf::from("track.wav"),
            audio_bitrate: 320_000,
            ..VideoSettings::default()
        };
        let args: Vec<String> = build_args(&settings)
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();

        assert!(!args.contains(&"-maxrate".to_string()));
        let inputs: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(inputs.len(), 2);
        assert_eq!(args[inputs[1] + 1], "track.wav");
        let at = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[at("-b:a") + 1], "320k");
        assert!(at("-shortest") < args.len() - 1);
    }

    #[test]
    fn test_audio_checks() {
        let mut settings = small_settings();
        settings.include_audio = true;
        assert!(matches!(check_audio(&settings), Err(EncoderError::NoAudioPath)));

        settings.audio_file_path = PathBuf::from("/definitely/not/here.wav");
        assert!(matches!(
            check_audio(&settings),
            Err(EncoderError::AudioFileMissing(_))
        ));

        let audio = tempfile::NamedTempFile::new().unwrap();
        settings.audio_file_path = audio.path().to_path_buf();
        assert!(check_audio(&settings).is_ok());
    }

    #[test]
    fn test_missing_executable() {
        let settings = VideoSettings {
            ffmpeg_executable_path: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..small_settings()
        };
        assert!(matches!(
            EncoderPipe::start(&settings),
            Err(EncoderError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable shell script standing in for the encoder.
        fn fake_encoder(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-ffmpeg");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_frames_reach_encoder() {
            let dir = tempfile::tempdir().unwrap();
            // The last argument is the output file.
            let script = fake_encoder(dir.path(), r#"for last; do :; done; cat > "$last""#);
            let settings = VideoSettings {
                ffmpeg_executable_path: script,
                output_path: dir.path().join("video.raw"),
                ..small_settings()
            };

            let mut pipe = EncoderPipe::start(&settings).unwrap();
            let frame = vec![7u8; settings.frame_size()];
            for _ in 0..3 {
                pipe.write_frame(&frame).unwrap();
            }
            assert_eq!(pipe.frames_written(), 3);
            let status = pipe.finish().unwrap();
            assert!(status.success());

            let written = fs::read(dir.path().join("video.raw")).unwrap();
            assert_eq!(written.len(), 3 * 4 * 2 * 4);
        }

        #[test]
        fn test_wrong_frame_size_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_encoder(dir.path(), "cat > /dev/null");
            let settings = VideoSettings {
                ffmpeg_executable_path: script,
                ..small_settings()
            };

            let mut pipe = EncoderPipe::start(&settings).unwrap();
            let err = pipe.write_frame(&[0u8; 31]).unwrap_err();
            assert!(matches!(
                err,
                EncoderError::FrameSize {
                    expected: 32,
                    actual: 31
                }
            ));
            assert_eq!(pipe.frames_written(), 0);
        }

        #[test]
        fn test_nonzero_exit_is_not_fatal() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_encoder(dir.path(), "cat > /dev/null; exit 3");
            let settings = VideoSettings {
                ffmpeg_executable_path: script,
                ..small_settings()
            };

            let mut pipe = EncoderPipe::start(&settings).unwrap();
            pipe.write_frame(&[0u8; 32]).unwrap();
            let status = pipe.finish().unwrap();
            assert_eq!(status.code(), Some(3));
        }

        #[test]
        fn test_audio_rejected_before_spawn() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("spawned");
            let script = fake_encoder(
                dir.path(),
                &format!("touch {:?}; cat > /dev/null", marker),
            );
            let settings = VideoSettings {
                ffmpeg_executable_path: script,
                include_audio: true,
                audio_file_path: dir.path().join("missing.wav"),
                ..small_settings()
            };

            assert!(matches!(
                EncoderPipe::start(&settings),
                Err(EncoderError::AudioFileMissing(_))
            ));
            assert!(!marker.exists());
        }

        #[test]
        fn test_write_after_encoder_exits() {
            let dir = tempfile::tempdir().unwrap();
            let script = fake_encoder(dir.path(), "exit 0");
            let settings = VideoSettings {
                ffmpeg_executable_path: script,
                width: 256,
                height: 256,
                ..VideoSettings::default()
            };

            let mut pipe = EncoderPipe::start(&settings).unwrap();
            let frame = vec![0u8; settings.frame_size()];
            // The reader is gone, so some write eventually reports a broken pipe.
            let failed = (0..64).any(|_| pipe.write_frame(&frame).is_err());
            assert!(failed);
        }
    }
}
