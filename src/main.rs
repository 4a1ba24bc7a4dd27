//! midivid - Renders a MIDI file to a video of a lit-up keyboard.
//!
//! Playback runs on a fixed 60 Hz clock, so the output is frame-exact no
//! matter how fast frames are encoded.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- song.mid                            # writes song_output.mp4
//! cargo run -- -r 1280x720 -br 4M -af song.wav song.mid
//! ```

use anyhow::{bail, Context, Result};
use midivid::video::{parse_bitrate, parse_resolution};
use midivid::{ColorMode, KeyStrip, Session, SoftwareRenderer, VideoSettings};
use std::path::{Path, PathBuf};

/// Command-line options for the application.
///
/// Every field except `input` overrides the value from the settings file
/// (or the defaults) only when given.
#[derive(Default)]
struct CliOptions {
    input: Option<PathBuf>,
    settings_file: Option<PathBuf>,
    video_codec: Option<String>,
    resolution: Option<(u32, u32)>,
    bitrate: Option<u32>,
    use_cbr: Option<bool>,
    audio_file: Option<PathBuf>,
    audio_bitrate: Option<u32>,
    color_mode: Option<ColorMode>,
    ffmpeg_path: Option<PathBuf>,
    output: Option<PathBuf>,
    debug: bool,
}

fn print_help(program: &str) {
    eprintln!("midivid - Render a MIDI file to video");
    eprintln!();
    eprintln!("Usage: {} [OPTIONS] <file.mid>", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -vc, --video-codec NAME    Video codec (default libx264)");
    eprintln!("  -r, --resolution WxH       Output resolution (default 1920x1080)");
    eprintln!("  -br, --bitrate RATE        Video bitrate, e.g. 8M or 5000k (default 8M)");
    eprintln!("      --cbr                  Constant bitrate (default)");
    eprintln!("      --vbr, --no-cbr        Variable bitrate");
    eprintln!("  -af, --audio-file PATH     Mux an audio track into the video");
    eprintln!("  -ab, --audio-bitrate RATE  Audio bitrate (default 192k)");
    eprintln!("  -cm, --color-mode MODE     Blip colors by channel, track or both");
    eprintln!("  -fp, --ffmpeg-path PATH    ffmpeg executable (default: ffmpeg on PATH)");
    eprintln!("  -o, --output PATH          Output file (default <input>_output.mp4)");
    eprintln!("  -s, --settings PATH        Load settings from a JSON file");
    eprintln!("  -d, --debug                Draw recording statistics into the video");
    eprintln!("  -h, --help                 Print this help message");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for verbose logging.");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("midivid");
        let mut options = Self::default();
        let mut i = 1;

        let value = |i: &mut usize, flag: &str| -> Result<String> {
            *i += 1;
            match args.get(*i) {
                Some(value) => Ok(value.clone()),
                None => bail!("{} requires a value", flag),
            }
        };

        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--video-codec" | "-vc" => options.video_codec = Some(value(&mut i, flag)?),
                "--resolution" | "-r" => {
                    options.resolution = Some(parse_resolution(&value(&mut i, flag)?)?)
                }
                "--bitrate" | "-br" => options.bitrate = Some(parse_bitrate(&value(&mut i, flag)?)?),
                "--cbr" => options.use_cbr = Some(true),
                "--vbr" | "--no-cbr" => options.use_cbr = Some(false),
                "--audio-file" | "-af" => {
                    options.audio_file = Some(PathBuf::from(value(&mut i, flag)?))
                }
                "--audio-bitrate" | "-ab" => {
                    options.audio_bitrate = Some(parse_bitrate(&value(&mut i, flag)?)?)
                }
                "--color-mode" | "-cm" => {
                    options.color_mode = Some(value(&mut i, flag)?.parse()?)
                }
                "--ffmpeg-path" | "-fp" => {
                    options.ffmpeg_path = Some(PathBuf::from(value(&mut i, flag)?))
                }
                "--output" | "-o" => options.output = Some(PathBuf::from(value(&mut i, flag)?)),
                "--settings" | "-s" => {
                    options.settings_file = Some(PathBuf::from(value(&mut i, flag)?))
                }
                "--debug" | "-d" => options.debug = true,
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    bail!("Unknown option: {} (use --help for usage information)", other)
                }
                other => {
                    if options.input.is_some() {
                        bail!("Only one MIDI file can be rendered at a time");
                    }
                    options.input = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        if options.input.is_none() {
            print_help(program);
            bail!("No MIDI file given");
        }
        Ok(options)
    }

    /// Builds the video settings from the settings file and the overrides.
    fn video_settings(&self, input: &Path) -> Result<VideoSettings> {
        let mut settings = match &self.settings_file {
            Some(path) => VideoSettings::load_from_file(path)?,
            None => VideoSettings::default(),
        };

        if let Some(codec) = &self.video_codec {
            settings.video_codec = codec.clone();
        }
        if let Some((width, height)) = self.resolution {
            settings.width = width;
            settings.height = height;
        }
        if let Some(bitrate) = self.bitrate {
            settings.bitrate = bitrate;
        }
        if let Some(use_cbr) = self.use_cbr {
            settings.use_cbr = use_cbr;
        }
        if let Some(audio) = &self.audio_file {
            settings.include_audio = true;
            settings.audio_file_path = audio.clone();
        }
        if let Some(bitrate) = self.audio_bitrate {
            settings.audio_bitrate = bitrate;
        }
        if let Some(mode) = self.color_mode {
            settings.color_mode = mode;
        }
        if let Some(path) = &self.ffmpeg_path {
            settings.ffmpeg_executable_path = path.clone();
        }
        if self.debug {
            settings.show_debug_info = true;
        }

        settings.output_path = match &self.output {
            Some(path) => path.clone(),
            None if self.settings_file.is_some()
                && settings.output_path != VideoSettings::default().output_path =>
            {
                settings.output_path.clone()
            }
            None => default_output_path(input),
        };
        Ok(settings)
    }
}

/// `<dir>/<stem>_output.mp4` next to the input file.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "midivid".to_string());
    input.with_file_name(format!("{}_output.mp4", stem))
}

fn run(cli: &CliOptions, input: &Path) -> Result<u64> {
    let settings = cli.video_settings(input)?;

    let renderer = SoftwareRenderer::new(settings.width, settings.height);
    let mut session = Session::new(renderer, KeyStrip::new());
    session
        .load_file(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    session
        .start_recording(settings)
        .context("Failed to start video output")?;

    let frames = session.run_to_end().context("Recording aborted")?;
    Ok(frames)
}

/// Main entry point.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match CliOptions::parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    let Some(input) = cli.input.clone() else {
        std::process::exit(1);
    };

    match run(&cli, &input) {
        Ok(frames) => {
            tracing::info!("Done: {} frames written", frames);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("songs/prelude.mid")),
            PathBuf::from("songs/prelude_output.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("take")),
            PathBuf::from("take_output.mp4")
        );
    }

    #[test]
    fn test_overrides_apply_over_defaults() {
        let cli = CliOptions {
            input: Some(PathBuf::from("a.mid")),
            resolution: Some((1280, 720)),
            use_cbr: Some(false),
            audio_file: Some(PathBuf::from("a.wav")),
            color_mode: Some(ColorMode::Both),
            debug: true,
            ..CliOptions::default()
        };
        let settings = cli.video_settings(Path::new("a.mid")).unwrap();

        assert_eq!((settings.width, settings.height), (1280, 720));
        assert!(!settings.use_cbr);
        assert!(settings.include_audio);
        assert_eq!(settings.audio_file_path, PathBuf::from("a.wav"));
        assert_eq!(settings.color_mode, ColorMode::Both);
        assert!(settings.show_debug_info);
        assert_eq!(settings.output_path, PathBuf::from("a_output.mp4"));
        assert_eq!(settings.video_codec, "libx264");
    }
}
