use std::time::Duration;

use voxdub_interface::EngineError;

use crate::{classify_reqwest, SynthesisRequest, DEFAULT_TTS_TIMEOUT_SECS};

const PROVIDER: &str = "xtts_local";

/// Adapter for the XTTS server on this host. Clones the source speaker
/// from reference audio; GPU-resident, so callers hold the resource gate.
#[derive(Debug, Clone)]
pub struct XttsClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl XttsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TTS_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn unload_url(&self) -> String {
        format!("{}/unload", self.base_url)
    }

    pub(crate) async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Vec<u8>, EngineError> {
        let mut form = reqwest::multipart::Form::new()
            .text("text", request.text.to_string())
            .text("language", request.language.code().to_string());

        if let Some(speaker) = request.speaker_wav {
            let bytes = tokio::fs::read(speaker).await.map_err(|e| EngineError::Fatal {
                provider: PROVIDER,
                message: format!("failed to read speaker reference: {e}"),
            })?;
            form = form.part(
                "speaker_wav",
                reqwest::multipart::Part::bytes(bytes).file_name("speaker.wav"),
            );
        }

        let response = self
            .http
            .post(format!("{}/tts_to_audio", self.base_url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if EngineError::looks_like_oom(&body) {
                return Err(EngineError::ResourceExhausted { provider: PROVIDER, message: body });
            }
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;
        Ok(bytes.to_vec())
    }
}
