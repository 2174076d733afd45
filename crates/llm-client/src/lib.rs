//! Chat-completion clients for the translation and evaluation stages.
//!
//! One module per provider; every client exposes the same `complete`
//! surface and maps provider failures onto the shared [`EngineError`]
//! taxonomy so the dispatcher's fallback policy stays provider-agnostic.

mod gemini;
mod groq;
mod ollama;
pub mod repair;

use std::sync::OnceLock;

use regex::Regex;
use voxdub_interface::EngineError;

pub use gemini::GeminiClient;
pub use groq::GroqClient;
pub use ollama::OllamaClient;

pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            user: user.into(),
            temperature: 0.3,
            max_tokens: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A concrete chat backend. Enum dispatch keeps call sites free of boxed
/// futures while the orchestrator walks fallback chains. No Debug: the
/// remote clients hold credentials.
#[derive(Clone)]
pub enum ChatEngine {
    Ollama(OllamaClient),
    Groq(GroqClient),
    Gemini(GeminiClient),
}

impl ChatEngine {
    pub fn provider(&self) -> &'static str {
        match self {
            ChatEngine::Ollama(_) => "ollama",
            ChatEngine::Groq(_) => "groq",
            ChatEngine::Gemini(_) => "gemini",
        }
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
        let raw = match self {
            ChatEngine::Ollama(c) => c.complete(request).await?,
            ChatEngine::Groq(c) => c.complete(request).await?,
            ChatEngine::Gemini(c) => c.complete(request).await?,
        };

        let cleaned = strip_think_tags(&raw);
        if cleaned.is_empty() {
            return Err(EngineError::Exhausted { provider: self.provider() });
        }
        Ok(cleaned)
    }
}

/// Reasoning models interleave `<think>` blocks with the answer; only the
/// answer survives.
pub fn strip_think_tags(text: &str) -> String {
    static THINK: OnceLock<Regex> = OnceLock::new();
    let re = THINK.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("think regex"));
    re.replace_all(text, "").trim().to_string()
}

pub(crate) fn classify_reqwest(provider: &'static str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() || err.is_connect() {
        EngineError::Transient { provider, message: err.to_string() }
    } else {
        EngineError::Fatal { provider, message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_think_blocks() {
        let raw = "<think>internal\nreasoning</think>\nFinal answer";
        assert_eq!(strip_think_tags(raw), "Final answer");
    }

    #[test]
    fn passes_plain_text() {
        assert_eq!(strip_think_tags("  hello  "), "hello");
    }
}
