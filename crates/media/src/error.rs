#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("path failed validation: {path}")]
    InvalidPath { path: String },
    #[error("{tool} not found in PATH")]
    BinaryMissing { tool: String },
    #[error("{tool} exceeded the {secs}s deadline and was killed")]
    Timeout { tool: String, secs: u64 },
    #[error("{tool} failed: {stderr}")]
    CommandFailed { tool: String, stderr: String },
    #[error("could not determine media duration for {path}")]
    DurationUnavailable { path: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
