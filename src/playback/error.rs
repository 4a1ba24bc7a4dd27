use crate::midi::ParseError;
use crate::video::EncoderError;
use thiserror::Error;

/// Errors from playback control and recording.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no MIDI file is loaded")]
    NoDocument,

    #[error("video output already in progress")]
    AlreadyRecording,

    #[error("no video output in progress")]
    NotRecording,

    #[error("failed to load MIDI file: {0}")]
    Load(#[from] ParseError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),
}
