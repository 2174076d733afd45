//! Timeline-aware assembly of synthesized speech onto the source video's
//! clock, plus the WAV plumbing the engine adapters and mux stage share.

mod assembler;
mod tempo;
mod wav;

pub use assembler::{Assembler, GAP_FLOOR_MS, TRACK_SAMPLE_RATE};
pub use tempo::time_stretch;
pub use wav::{decode_wav, encode_wav, resample_linear, write_wav_file};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("failed to decode wav payload: {0}")]
    Decode(String),
    #[error("audio payload decoded to zero samples")]
    Empty,
    #[error("segment {index} has no audio and is not a silence substitute")]
    EmptySegment { index: usize },
    #[error("segment windows and synthesized segments are misaligned")]
    WindowMismatch,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
