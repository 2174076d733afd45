use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("segment {index} has empty text")]
    EmptyText { index: usize },
    #[error("segment {index} ends before it starts ({start:.3}s > {end:.3}s)")]
    NegativeSpan { index: usize, start: f64, end: f64 },
    #[error("segment {index} starts at {start:.3}s, before the previous segment")]
    NonMonotonic { index: usize, start: f64 },
    #[error("segment {index} overlaps the previous segment")]
    Overlap { index: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Segment {
    pub fn duration_secs(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Ordered, validated sequence of speech segments.
///
/// Invariants enforced at construction: text is non-empty, spans are
/// non-negative, starts are strictly increasing, segments never overlap.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    segments: Vec<Segment>,
}

impl Transcript {
    pub fn new(segments: Vec<Segment>) -> Result<Self, TranscriptError> {
        let mut prev: Option<&Segment> = None;
        for (index, seg) in segments.iter().enumerate() {
            if seg.text.trim().is_empty() {
                return Err(TranscriptError::EmptyText { index });
            }
            if seg.end_secs < seg.start_secs {
                return Err(TranscriptError::NegativeSpan {
                    index,
                    start: seg.start_secs,
                    end: seg.end_secs,
                });
            }
            if let Some(p) = prev {
                if seg.start_secs <= p.start_secs {
                    return Err(TranscriptError::NonMonotonic {
                        index,
                        start: seg.start_secs,
                    });
                }
                if seg.start_secs < p.end_secs {
                    return Err(TranscriptError::Overlap { index });
                }
            }
            prev = Some(seg);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn total_chars(&self) -> usize {
        self.segments.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn joined_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A contiguous span of transcript segments batched for one translator
/// call, sized by running character count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationChunk {
    /// Index of the first segment of this chunk within the transcript.
    pub first_segment: usize,
    pub source_texts: Vec<String>,
    /// Populated after translation, aligned 1:1 with `source_texts`.
    pub translated_texts: Vec<String>,
    pub start_secs: f64,
    pub end_secs: f64,
}

impl TranslationChunk {
    pub fn source_joined(&self) -> String {
        self.source_texts.join(" ")
    }

    pub fn translated_joined(&self) -> String {
        self.translated_texts.join(" ")
    }

    pub fn char_count(&self) -> usize {
        self.source_texts.iter().map(|t| t.chars().count()).sum()
    }
}

/// One synthesized utterance, mono PCM at `sample_rate`.
#[derive(Debug, Clone)]
pub struct SynthesizedSegment {
    pub segment_index: usize,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// True when the engine failed softly and a silence stand-in was
    /// substituted; the only case where zero duration is legal.
    pub is_silence: bool,
}

impl SynthesizedSegment {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
