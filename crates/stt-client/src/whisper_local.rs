use std::path::Path;
use std::time::Duration;

use voxdub_interface::{EngineError, Language, Transcript};

use crate::{classify_reqwest, response, ComputeHint, DEFAULT_STT_TIMEOUT_SECS};

const PROVIDER: &str = "whisper_local";

/// Adapter for the faster-whisper server running beside the process. The
/// model is GPU-resident, so callers must hold the resource gate for the
/// duration of the request.
#[derive(Debug, Clone)]
pub struct WhisperLocalClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl WhisperLocalClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_STT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// URL of the server's unload endpoint, wired into the resource
    /// gate's cleanup hook.
    pub fn unload_url(&self) -> String {
        format!("{}/v1/models/unload", self.base_url)
    }

    pub(crate) async fn transcribe(
        &self,
        audio: &Path,
        language: Option<Language>,
        hint: ComputeHint,
    ) -> Result<Transcript, EngineError> {
        let bytes = tokio::fs::read(audio).await.map_err(|e| EngineError::Fatal {
            provider: PROVIDER,
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
        if hint == ComputeHint::Reduced {
            form = form
                .text("compute_type", "int8")
                .text("batch_size", "1");
        }

        let response = self
            .http
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        if !status.is_success() {
            if EngineError::looks_like_oom(&text) {
                return Err(EngineError::ResourceExhausted {
                    provider: PROVIDER,
                    message: text,
                });
            }
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), text));
        }

        response::parse_verbose_json(PROVIDER, &text)
    }
}
