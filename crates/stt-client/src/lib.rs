//! Transcription adapters.
//!
//! Local and remote engines all speak the whisper batch contract: a
//! multipart upload answered with `verbose_json` segments. Each adapter
//! maps its provider's failure modes onto [`EngineError`] and returns a
//! validated [`Transcript`].

mod response;
mod whisper_local;

use std::path::Path;
use std::time::Duration;

use voxdub_interface::{EngineError, Language, Transcript};

pub use response::VerboseTranscription;
pub use whisper_local::WhisperLocalClient;

pub const DEFAULT_STT_TIMEOUT_SECS: u64 = 300;

pub const GROQ_TRANSCRIPTION_URL: &str =
    "https://api.groq.com/openai/v1/audio/transcriptions";
pub const OPENAI_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Groq rejects uploads above 25 MB; checked client-side so the job fails
/// with a usable message instead of an opaque 413.
const GROQ_MAX_UPLOAD: u64 = 25 * 1024 * 1024;

/// Degraded-precision request issued after a device OOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeHint {
    #[default]
    Full,
    /// int8 inference, smaller batch.
    Reduced,
}

#[derive(Clone)]
pub enum SttClient {
    WhisperLocal(WhisperLocalClient),
    Groq(RemoteWhisperClient),
    Openai(RemoteWhisperClient),
}

impl SttClient {
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::Groq(RemoteWhisperClient::new(
            "groq",
            GROQ_TRANSCRIPTION_URL,
            api_key,
            "whisper-large-v3",
        ))
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::Openai(RemoteWhisperClient::new(
            "openai",
            OPENAI_TRANSCRIPTION_URL,
            api_key,
            "whisper-1",
        ))
    }

    pub fn provider(&self) -> &'static str {
        match self {
            SttClient::WhisperLocal(_) => "whisper_local",
            SttClient::Groq(_) => "groq",
            SttClient::Openai(_) => "openai",
        }
    }

    pub async fn transcribe(
        &self,
        audio: &Path,
        language: Option<Language>,
        hint: ComputeHint,
    ) -> Result<Transcript, EngineError> {
        let provider = self.provider();
        validate_audio_file(provider, audio).await?;

        let transcript = match self {
            SttClient::WhisperLocal(client) => client.transcribe(audio, language, hint).await?,
            SttClient::Groq(client) => {
                enforce_upload_cap(provider, audio, GROQ_MAX_UPLOAD).await?;
                client.transcribe(audio, language).await?
            }
            SttClient::Openai(client) => client.transcribe(audio, language).await?,
        };

        if transcript.is_empty() {
            return Err(EngineError::Exhausted { provider });
        }
        Ok(transcript)
    }
}

async fn validate_audio_file(provider: &'static str, audio: &Path) -> Result<(), EngineError> {
    let meta = tokio::fs::metadata(audio).await.map_err(|e| EngineError::Fatal {
        provider,
        message: format!("audio file unavailable: {e}"),
    })?;
    if meta.len() == 0 {
        return Err(EngineError::Exhausted { provider });
    }
    Ok(())
}

async fn enforce_upload_cap(
    provider: &'static str,
    audio: &Path,
    cap: u64,
) -> Result<(), EngineError> {
    let len = tokio::fs::metadata(audio)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    if len > cap {
        return Err(EngineError::Fatal {
            provider,
            message: format!(
                "audio file is {} MB, above the provider's {} MB upload cap",
                len / (1024 * 1024),
                cap / (1024 * 1024)
            ),
        });
    }
    Ok(())
}

/// Whisper-over-HTTP adapter shared by the OpenAI-compatible remotes.
/// No Debug: carries its bearer credential.
#[derive(Clone)]
pub struct RemoteWhisperClient {
    provider: &'static str,
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl RemoteWhisperClient {
    pub fn new(
        provider: &'static str,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_STT_TIMEOUT_SECS),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<Language>,
    ) -> Result<Transcript, EngineError> {
        let provider = self.provider;
        let bytes = tokio::fs::read(audio).await.map_err(|e| EngineError::Fatal {
            provider,
            message: format!("failed to read audio: {e}"),
        })?;

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name("audio.wav"),
            )
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(lang) = language.filter(|l| *l != Language::Auto) {
            form = form.text("language", lang.code().to_string());
        }

        let response = self
            .http
            .post(&self.url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_reqwest(provider, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest(provider, e))?;

        if !status.is_success() {
            return Err(EngineError::from_status(provider, status.as_u16(), text));
        }

        response::parse_verbose_json(provider, &text)
    }
}

pub(crate) fn classify_reqwest(provider: &'static str, err: reqwest::Error) -> EngineError {
    if err.is_timeout() || err.is_connect() {
        EngineError::Transient { provider, message: err.to_string() }
    } else {
        EngineError::Fatal { provider, message: err.to_string() }
    }
}
