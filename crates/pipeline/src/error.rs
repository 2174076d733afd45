use voxdub_audio::AudioError;
use voxdub_gate::GateError;
use voxdub_interface::{EngineError, Stage};
use voxdub_media::MediaError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cancellation observed at a checkpoint; converted to the cancelled
    /// status, never to `failed`.
    #[error("cancelled")]
    Cancelled,

    #[error("no engines configured for the {0:?} stage")]
    NoEngines(Stage),

    #[error(transparent)]
    Engine(EngineError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => Self::Cancelled,
            other => Self::Engine(other),
        }
    }
}

impl From<GateError> for PipelineError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Cancelled => Self::Cancelled,
        }
    }
}
