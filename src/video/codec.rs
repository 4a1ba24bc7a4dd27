//! Encoder-specific argument tables.
//!
//! Software and hardware encoders spell their preset, tuning and rate-control
//! options differently. Each known codec maps to a [`CodecFamily`] that knows
//! its own flag names.

/// Encoders grouped by how they take their options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    /// libx264 / libx265
    X26x { crf: u8 },
    /// NVIDIA NVENC
    Nvenc,
    /// Intel Quick Sync Video
    Qsv { global_quality: u8 },
    /// AMD AMF
    Amf,
    /// libvpx-vp9
    Vp9,
    /// Anything else: basic settings only.
    Unknown,
}

impl CodecFamily {
    /// Classifies an encoder name as used with `-c:v`.
    pub fn of(codec: &str) -> Self {
        match codec {
            "libx264" => CodecFamily::X26x { crf: 23 },
            "libx265" => CodecFamily::X26x { crf: 28 },
            "h264_nvenc" | "hevc_nvenc" => CodecFamily::Nvenc,
            "h264_qsv" => CodecFamily::Qsv { global_quality: 23 },
            "hevc_qsv" => CodecFamily::Qsv { global_quality: 28 },
            "h264_amf" | "hevc_amf" => CodecFamily::Amf,
            "libvpx-vp9" => CodecFamily::Vp9,
            _ => CodecFamily::Unknown,
        }
    }

    /// Whether the encoder runs on dedicated hardware.
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            CodecFamily::Nvenc | CodecFamily::Qsv { .. } | CodecFamily::Amf
        )
    }
}

/// Codecs offered on the command line.
pub const SUPPORTED_CODECS: [&str; 9] = [
    "libx264",
    "libx265",
    "libvpx-vp9",
    "h264_nvenc",
    "hevc_nvenc",
    "h264_qsv",
    "hevc_qsv",
    "h264_amf",
    "hevc_amf",
];

/// Codec-specific options, placed right after `-c:v <codec>`.
///
/// Quality-targeting knobs (`-crf`, `-global_quality`) are only emitted for
/// variable bitrate; with constant bitrate the encoder is driven by the
/// bitrate flags alone.
pub fn codec_args(codec: &str, use_cbr: bool) -> Vec<String> {
    let quality;
    let mut args: Vec<&str> = Vec::new();

    match CodecFamily::of(codec) {
        CodecFamily::X26x { crf } => {
            args.extend(["-preset", "ultrafast", "-tune", "zerolatency"]);
            if !use_cbr {
                quality = crf.to_string();
                args.extend(["-crf", quality.as_str()]);
            }
            args.extend(["-threads", "0"]);
        }
        CodecFamily::Nvenc => {
            args.extend(["-preset", "p1", "-tune", "ll", "-rc"]);
            args.push(if use_cbr { "cbr" } else { "vbr" });
            args.extend(["-gpu", "0"]);
        }
        CodecFamily::Qsv { global_quality } => {
            args.extend(["-preset", "veryfast", "-look_ahead", "0"]);
            if !use_cbr {
                quality = global_quality.to_string();
                args.extend(["-global_quality", quality.as_str()]);
            }
        }
        CodecFamily::Amf => {
            args.extend(["-quality", "speed", "-rc"]);
            args.push(if use_cbr { "cbr" } else { "vbr_peak" });
        }
        CodecFamily::Vp9 => {
            args.extend(["-deadline", "realtime", "-cpu-used", "8", "-threads", "0"]);
        }
        CodecFamily::Unknown => {
            tracing::warn!("Unknown codec '{}', using basic settings", codec);
            args.extend(["-threads", "0"]);
        }
    }

    args.into_iter().map(String::from).collect()
}

/// Bitrate options: `-b:v`, plus `-maxrate` and `-bufsize` for constant bitrate.
pub fn rate_control_args(bitrate: u32, use_cbr: bool) -> Vec<String> {
    let mut args = vec!["-b:v".to_string(), bitrate.to_string()];
    if use_cbr {
        args.push("-maxrate".to_string());
        args.push(bitrate.to_string());
        args.push("-bufsize".to_string());
        args.push((bitrate as u64 * 2).to_string());
    }
    args
}
