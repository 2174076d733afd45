/// Failure classification shared by every external engine adapter. The
/// orchestrator's retry and fallback policy keys off the variant, so
/// adapters must map provider responses onto these kinds faithfully.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 429 or a documented quota response. The fallback chain advances
    /// immediately, no backoff.
    #[error("{provider} quota exhausted: {message}")]
    Quota { provider: &'static str, message: String },

    /// 5xx, timeout, connection reset. Retried with exponential backoff
    /// before the chain advances.
    #[error("{provider} transient failure: {message}")]
    Transient { provider: &'static str, message: String },

    /// The provider answered but the payload is unusable even after
    /// repair.
    #[error("{provider} returned a malformed response: {message}")]
    Malformed { provider: &'static str, message: String },

    /// The engine produced nothing to work with (empty transcript, empty
    /// translation). Hard failure, never retried.
    #[error("{provider} produced empty output")]
    Exhausted { provider: &'static str },

    /// GPU out-of-memory on a local engine. The caller releases the gate,
    /// downgrades the compute hint and retries once.
    #[error("{provider} ran out of device memory: {message}")]
    ResourceExhausted { provider: &'static str, message: String },

    /// Missing binary, non-zero subprocess exit, invalid local setup.
    #[error("{provider} fatal failure: {message}")]
    Fatal { provider: &'static str, message: String },

    /// Cancellation observed at a checkpoint. Not an error in the usual
    /// sense; the orchestrator converts it to the cancelled status.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::Quota { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify an HTTP status from a provider.
    pub fn from_status(provider: &'static str, status: u16, body: String) -> Self {
        match status {
            429 => Self::Quota { provider, message: body },
            s if s >= 500 => Self::Transient { provider, message: body },
            _ => Self::Fatal {
                provider,
                message: format!("http {status}: {body}"),
            },
        }
    }

    /// Heuristic for quota phrasing that arrives without a clean 429,
    /// mirroring how the Gemini SDK surfaces resource exhaustion.
    pub fn looks_like_quota(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        ["429", "quota", "resource exhausted", "rate limit"]
            .iter()
            .any(|kw| lower.contains(kw))
    }

    /// Heuristic for device OOM phrasing from local engines.
    pub fn looks_like_oom(message: &str) -> bool {
        let lower = message.to_ascii_lowercase();
        ["out of memory", "cuda error", "cublas", "vram"]
            .iter()
            .any(|kw| lower.contains(kw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status() {
        assert!(EngineError::from_status("groq", 429, String::new()).is_quota());
        assert!(EngineError::from_status("groq", 503, String::new()).is_transient());
        assert!(matches!(
            EngineError::from_status("groq", 400, String::new()),
            EngineError::Fatal { .. }
        ));
    }

    #[test]
    fn quota_phrasing() {
        assert!(EngineError::looks_like_quota("Resource exhausted (429)"));
        assert!(!EngineError::looks_like_quota("connection reset"));
    }
}
