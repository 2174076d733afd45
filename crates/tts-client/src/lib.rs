//! Synthesis adapters. Every engine answers with mono WAV bytes; decoding
//! and timeline placement happen downstream in the assembler.

mod edge;
mod elevenlabs;
mod xtts;

use std::path::Path;

use voxdub_interface::{EngineError, Language};

pub use edge::{edge_voice_for, EdgeClient};
pub use elevenlabs::{ElevenLabsClient, ElevenLabsUsage};
pub use xtts::XttsClient;

pub const DEFAULT_TTS_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub language: Language,
    /// Reference audio for voice cloning; ignored by engines that cannot
    /// clone.
    pub speaker_wav: Option<&'a Path>,
}

#[derive(Clone)]
pub enum TtsClient {
    Xtts(XttsClient),
    Elevenlabs(ElevenLabsClient),
    Edge(EdgeClient),
}

impl TtsClient {
    pub fn provider(&self) -> &'static str {
        match self {
            TtsClient::Xtts(_) => "xtts_local",
            TtsClient::Elevenlabs(_) => "elevenlabs",
            TtsClient::Edge(_) => "edge",
        }
    }

    /// Synthesize one utterance; returns WAV bytes.
    pub async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, EngineError> {
        if request.text.trim().is_empty() {
            return Err(EngineError::Exhausted { provider: self.provider() });
        }

        let wav = match self {
            TtsClient::Xtts(client) => client.synthesize(request).await?,
            TtsClient::Elevenlabs(client) => client.synthesize(request).await?,
            TtsClient::Edge(client) => client.synthesize(request).await?,
        };

        if wav.is_empty() {
            return Err(EngineError::Exhausted { provider: self.provider() });
        }
        Ok(wav)
    }
}

pub(crate) fn classify_reqwest(provider: &'static str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() || err.is_connect() {
        EngineError::Transient { provider, message: err.to_string() }
    } else {
        EngineError::Fatal { provider, message: err.to_string() }
    }
}

/// Wrap raw 16-bit little-endian PCM into a WAV container. ElevenLabs'
/// `pcm_*` output formats arrive headerless.
pub(crate) fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("in-memory wav writer");
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample).expect("in-memory wav write");
        }
        writer.finalize().expect("in-memory wav finalize");
    }
    cursor.into_inner()
}
