//! The job pipeline: registry, engine dispatch, and the per-job worker
//! that drives extract → transcribe → translate → [verify] → synthesize →
//! merge under cooperative cancellation.

mod dispatcher;
mod engines;
mod error;
mod manager;
mod orchestrator;

pub use dispatcher::Dispatcher;
pub use engines::EngineRegistry;
pub use error::PipelineError;
pub use manager::JobManager;
pub use orchestrator::{Pipeline, PipelineConfig};
