//! Errors raised while loading a Standard MIDI File.

use thiserror::Error;

/// Errors that can occur while loading a MIDI document.
///
/// Only structural problems surface here. Damage inside a track's event
/// stream never fails the load: the affected cursor just ends early.
#[derive(Debug, Error)]
pub enum ParseError {
    /// File could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic or an unsupported header structure.
    #[error("invalid MIDI header: {0}")]
    InvalidHeader(String),

    /// Chunk layout is inconsistent with the buffer.
    #[error("corrupted MIDI data: {0}")]
    CorruptedData(String),
}
