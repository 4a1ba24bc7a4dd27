//! Video output settings.
//!
//! Settings can be persisted as JSON. Every field has a default, so partial
//! settings files load cleanly.

use super::encoder::EncoderError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Program looked up on `PATH` when no encoder executable is configured.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

/// How note blips are colored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Color by MIDI channel.
    #[default]
    Channel,
    /// Color by track index.
    Track,
    /// Average of the channel and track colors.
    Both,
}

impl ColorMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorMode::Channel => "channel",
            ColorMode::Track => "track",
            ColorMode::Both => "both",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "channel" => Ok(ColorMode::Channel),
            "track" => Ok(ColorMode::Track),
            "both" => Ok(ColorMode::Both),
            _ => bail!(
                "Invalid color mode '{}'. Supported values are channel, track, both",
                s
            ),
        }
    }
}

/// Everything needed to start one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    /// Frame rate passed to the encoder.
    pub fps: u32,
    /// Video bitrate in bits per second.
    pub bitrate: u32,
    /// Constant bitrate when true, otherwise variable bitrate targeting `bitrate`.
    pub use_cbr: bool,
    pub video_codec: String,
    pub color_mode: ColorMode,
    pub include_audio: bool,
    pub audio_file_path: PathBuf,
    /// Audio bitrate in bits per second.
    pub audio_bitrate: u32,
    /// Encoder executable; empty means `ffmpeg` from `PATH`.
    pub ffmpeg_executable_path: PathBuf,
    /// Output file; `.mp4` is appended when there is no extension.
    pub output_path: PathBuf,
    /// Draw the recording statistics overlay into each frame.
    pub show_debug_info: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
            bitrate: 8_000_000,
            use_cbr: true,
            video_codec: "libx264".to_string(),
            color_mode: ColorMode::Channel,
            include_audio: false,
            audio_file_path: PathBuf::new(),
            audio_bitrate: 192_000,
            ffmpeg_executable_path: PathBuf::new(),
            output_path: PathBuf::from("output_video"),
            show_debug_info: false,
        }
    }
}

impl VideoSettings {
    /// Size in bytes of one RGBA8 frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Output path with the container extension filled in.
    pub fn output_file(&self) -> PathBuf {
        if self.output_path.extension().is_some() {
            self.output_path.clone()
        } else {
            self.output_path.with_extension("mp4")
        }
    }

    /// Encoder program to launch.
    pub fn ffmpeg_program(&self) -> PathBuf {
        if self.ffmpeg_executable_path.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_FFMPEG)
        } else {
            self.ffmpeg_executable_path.clone()
        }
    }

    /// Checks that the settings describe a frame stream an encoder can accept.
    ///
    /// # Errors
    ///
    /// Returns `EncoderError::InvalidSettings` for zero dimensions, frame
    /// rate or bitrate, or an empty codec name.
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncoderError::InvalidSettings(format!(
                "resolution must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(EncoderError::InvalidSettings(
                "frame rate must be positive".to_string(),
            ));
        }
        if self.bitrate == 0 {
            return Err(EncoderError::InvalidSettings(
                "bitrate must be positive".to_string(),
            ));
        }
        if self.video_codec.trim().is_empty() {
            return Err(EncoderError::InvalidSettings(
                "video codec is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads settings from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings file: {:?}", path.as_ref()))
    }

    /// Saves settings to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize video settings")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write settings file: {:?}", path.as_ref()))
    }
}

/// Parses a bitrate such as `8000000`, `5000k`, `20M`, `1.5g` or `25mbps`.
///
/// Whitespace is ignored and suffixes are case-insensitive.
///
/// # Errors
///
/// Fails on empty input, a missing or unparsable number, a non-positive
/// result, or a value above `i32::MAX`.
pub fn parse_bitrate(input: &str) -> Result<u32> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        bail!("Bitrate value is empty");
    }
    let lower = compact.to_ascii_lowercase();

    let suffixes: [(&str, f64); 6] = [
        ("kbps", 1e3),
        ("mbps", 1e6),
        ("gbps", 1e9),
        ("k", 1e3),
        ("m", 1e6),
        ("g", 1e9),
    ];
    let (number, multiplier) = suffixes
        .iter()
        .find_map(|(suffix, mult)| lower.strip_suffix(suffix).map(|rest| (rest, *mult)))
        .unwrap_or((lower.as_str(), 1.0));

    if number.is_empty() {
        bail!("Bitrate value has no numeric component");
    }
    let numeric: f64 = number
        .parse()
        .with_context(|| format!("Failed to parse bitrate numeric value '{}'", number))?;

    let result = numeric * multiplier;
    if !result.is_finite() || result <= 0.0 {
        bail!("Bitrate must be positive");
    }
    if result > i32::MAX as f64 {
        bail!("Bitrate value exceeds supported range");
    }
    Ok(result.round() as u32)
}

/// Parses a `WIDTHxHEIGHT` resolution (either `x` or `X`).
pub fn parse_resolution(input: &str) -> Result<(u32, u32)> {
    let Some((w, h)) = input.split_once(['x', 'X']) else {
        bail!("Resolution must be in <width>x<height> format (e.g., 1920x1080)");
    };
    let width: u32 = w
        .trim()
        .parse()
        .with_context(|| format!("Invalid resolution width '{}'", w))?;
    let height: u32 = h
        .trim()
        .parse()
        .with_context(|| format!("Invalid resolution height '{}'", h))?;
    if width == 0 || height == 0 {
        bail!("Resolution dimensions must be positive");
    }
    Ok((width, height))
}
