//! Chunked translation against the chat engines.
//!
//! The chunker batches transcript segments toward the translator's sweet
//! spot, prompts carry a strict JSON-array contract, and responses go
//! through the shared repair ladder before the engine chain is allowed to
//! advance.

mod cache;
mod chunker;
pub mod prompt;
mod sanitize;

use voxdub_interface::{EngineError, Language, SyncMode, TranslationChunk};
use voxdub_llm::{repair, ChatEngine, ChatRequest};

pub use cache::{CacheEntry, CacheKey, TranslationCache};
pub use chunker::Chunker;
pub use sanitize::{sanitize_input, MAX_PROMPT_TEXT};

#[derive(Debug, Clone, Copy)]
pub struct TranslationOptions {
    pub source_lang: Language,
    pub target_lang: Language,
    pub sync_mode: SyncMode,
}

/// Translate one chunk with one engine. Fallback across engines is the
/// dispatcher's concern; this call either yields a 1:1 aligned set of
/// segment translations or a typed error describing why the chain should
/// move on.
pub async fn translate_chunk(
    engine: &ChatEngine,
    chunk: &TranslationChunk,
    options: &TranslationOptions,
) -> Result<Vec<String>, EngineError> {
    let request = ChatRequest::new(prompt::chunk_prompt(&chunk.source_texts))
        .with_system(prompt::system_prompt(
            options.source_lang,
            options.target_lang,
            options.sync_mode,
        ))
        .with_temperature(0.3);

    let response = engine.complete(&request).await?;
    parse_aligned_array(engine.provider(), &response, chunk.source_texts.len())
}

/// Re-translate one chunk with the evaluator's findings folded in.
pub async fn refine_chunk(
    engine: &ChatEngine,
    chunk: &TranslationChunk,
    previous: &[String],
    issues: &[String],
    options: &TranslationOptions,
) -> Result<Vec<String>, EngineError> {
    let request = ChatRequest::new(prompt::refine_prompt(
        &chunk.source_texts,
        previous,
        issues,
        options.sync_mode,
    ))
    .with_system(prompt::refine_system_prompt(
        options.source_lang,
        options.target_lang,
    ))
    .with_temperature(0.3);

    let response = engine.complete(&request).await?;
    parse_aligned_array(engine.provider(), &response, chunk.source_texts.len())
}

/// Parse the model response as a JSON string array of exactly `expected`
/// elements, running the mechanical repair ladder first.
fn parse_aligned_array(
    provider: &'static str,
    response: &str,
    expected: usize,
) -> Result<Vec<String>, EngineError> {
    let value = repair::parse_or_repair(response).ok_or_else(|| EngineError::Malformed {
        provider,
        message: "translation response is not JSON".into(),
    })?;

    let array = value.as_array().ok_or_else(|| EngineError::Malformed {
        provider,
        message: "translation response is not a JSON array".into(),
    })?;

    let texts: Vec<String> = array
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<_>>()
        .ok_or_else(|| EngineError::Malformed {
            provider,
            message: "translation array holds non-string entries".into(),
        })?;

    if texts.len() != expected {
        return Err(EngineError::Malformed {
            provider,
            message: format!(
                "translation array has {} entries, expected {expected}",
                texts.len()
            ),
        });
    }

    if texts.iter().all(|t| t.trim().is_empty()) {
        return Err(EngineError::Exhausted { provider });
    }

    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_array() {
        let texts = parse_aligned_array("groq", r#"["one", "two"]"#, 2).unwrap();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn repairs_fenced_array() {
        let texts =
            parse_aligned_array("groq", "```json\n[\"one\", \"two\"]\n```", 2).unwrap();
        assert_eq!(texts.len(), 2);
    }

    #[test]
    fn rejects_misaligned_array() {
        assert!(matches!(
            parse_aligned_array("groq", r#"["only one"]"#, 2),
            Err(EngineError::Malformed { .. })
        ));
    }

    #[test]
    fn rejects_empty_translations() {
        assert!(matches!(
            parse_aligned_array("groq", r#"["", "  "]"#, 2),
            Err(EngineError::Exhausted { .. })
        ));
    }

    #[test]
    fn rejects_non_array_payload() {
        assert!(matches!(
            parse_aligned_array("groq", r#"{"text": "nope"}"#, 1),
            Err(EngineError::Malformed { .. })
        ));
    }
}
