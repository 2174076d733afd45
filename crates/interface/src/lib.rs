mod engine;
mod error;
mod job;
mod language;
mod quality;
mod transcript;

pub use engine::{
    Credentials, EngineSpec, Locality, SttEngineId, TranslateEngineId, TtsEngineId,
};
pub use error::EngineError;
pub use job::{
    InputKind, JobId, JobSettings, JobStatus, JobView, LogEntry, Stage, SyncMode,
};
pub use language::Language;
pub use quality::{QualityBreakdown, QualityReport, Recommendation, TermPreservation};
pub use transcript::{
    Segment, SynthesizedSegment, Transcript, TranscriptError, TranslationChunk,
};
