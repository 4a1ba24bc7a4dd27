//! Video output: settings, encoder invocation and recording statistics.

mod codec;
mod encoder;
mod settings;
mod stats;

pub use codec::{codec_args, rate_control_args, CodecFamily, SUPPORTED_CODECS};
pub use encoder::{build_args, check_audio, EncoderError, EncoderPipe};
pub use settings::{parse_bitrate, parse_resolution, ColorMode, VideoSettings, DEFAULT_FFMPEG};
pub use stats::{format_duration, RecordingStats};
