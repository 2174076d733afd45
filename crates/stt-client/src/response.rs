use serde::Deserialize;
use voxdub_interface::{EngineError, Segment, Transcript};

/// The whisper `verbose_json` payload shape shared by the local server
/// and the OpenAI-compatible remotes.
#[derive(Debug, Deserialize)]
pub struct VerboseTranscription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<VerboseSegment>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerboseSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub avg_logprob: Option<f32>,
}

pub(crate) fn parse_verbose_json(
    provider: &'static str,
    body: &str,
) -> Result<Transcript, EngineError> {
    let parsed: VerboseTranscription = serde_json::from_str(body).map_err(|e| {
        EngineError::Malformed { provider, message: e.to_string() }
    })?;

    if let Some(language) = &parsed.language {
        tracing::debug!(provider, language = %language, "transcription_language_detected");
    }

    // Whisper occasionally emits zero-width or duplicated-timestamp
    // segments around silence; drop them instead of failing validation.
    let mut segments: Vec<Segment> = Vec::with_capacity(parsed.segments.len());
    let mut last_start = f64::NEG_INFINITY;
    let mut last_end = 0.0f64;
    for raw in parsed.segments {
        let text = raw.text.trim();
        if text.is_empty() || raw.end < raw.start || raw.start <= last_start {
            continue;
        }
        if !segments.is_empty() && raw.start < last_end {
            continue;
        }
        last_start = raw.start;
        last_end = raw.end;
        segments.push(Segment {
            start_secs: raw.start,
            end_secs: raw.end,
            text: text.to_string(),
            speaker: None,
            confidence: raw.avg_logprob.map(|lp| lp.exp().clamp(0.0, 1.0)),
        });
    }

    // Single-utterance providers return only the flat text field.
    if segments.is_empty() && !parsed.text.trim().is_empty() {
        segments.push(Segment {
            start_secs: 0.0,
            end_secs: 0.0,
            text: parsed.text.trim().to_string(),
            speaker: None,
            confidence: None,
        });
    }

    Transcript::new(segments).map_err(|e| EngineError::Malformed {
        provider,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segments() {
        let body = r#"{
            "text": "hello there",
            "language": "en",
            "segments": [
                {"start": 0.0, "end": 1.2, "text": " hello ", "avg_logprob": -0.2},
                {"start": 1.5, "end": 2.0, "text": "there"}
            ]
        }"#;
        let t = parse_verbose_json("groq", body).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.segments()[0].text, "hello");
        assert!(t.segments()[0].confidence.unwrap() > 0.7);
    }

    #[test]
    fn drops_degenerate_segments() {
        let body = r#"{
            "segments": [
                {"start": 0.0, "end": 1.0, "text": "a"},
                {"start": 0.0, "end": 1.0, "text": "dup start"},
                {"start": 2.0, "end": 1.0, "text": "backwards"},
                {"start": 3.0, "end": 4.0, "text": "  "},
                {"start": 5.0, "end": 6.0, "text": "b"}
            ]
        }"#;
        let t = parse_verbose_json("groq", body).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn falls_back_to_flat_text() {
        let t = parse_verbose_json("openai", r#"{"text": "just text"}"#).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.segments()[0].text, "just text");
    }

    #[test]
    fn malformed_body_is_typed() {
        assert!(matches!(
            parse_verbose_json("groq", "oops"),
            Err(EngineError::Malformed { .. })
        ));
    }
}
