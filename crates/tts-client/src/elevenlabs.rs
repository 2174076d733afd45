use std::time::Duration;

use serde::Deserialize;
use voxdub_interface::EngineError;

use crate::{classify_reqwest, pcm16_to_wav, SynthesisRequest, DEFAULT_TTS_TIMEOUT_SECS};

const PROVIDER: &str = "elevenlabs";
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Preset voice used when no reference audio is supplied or cloning fails.
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";
const PCM_SAMPLE_RATE: u32 = 24_000;

#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreatedVoice {
    voice_id: String,
}

#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize)]
pub struct ElevenLabsUsage {
    #[serde(rename = "character_count")]
    pub used: u64,
    #[serde(rename = "character_limit")]
    pub limit: u64,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: ELEVENLABS_BASE_URL.into(),
            api_key: api_key.into(),
            model_id: model_id.into(),
            timeout: Duration::from_secs(DEFAULT_TTS_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Subscription character budget, surfaced by the system status
    /// endpoint. Failures are swallowed; this is advisory only.
    pub async fn usage(&self) -> Option<ElevenLabsUsage> {
        let response = self
            .http
            .get(format!("{}/v1/user/subscription", self.base_url))
            .timeout(Duration::from_secs(3))
            .header("xi-api-key", &self.api_key)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.json().await.ok()
    }

    pub(crate) async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Vec<u8>, EngineError> {
        let cloned_voice = match request.speaker_wav {
            Some(speaker) => self.clone_voice(speaker).await,
            None => None,
        };
        let voice_id = cloned_voice
            .as_deref()
            .unwrap_or(DEFAULT_VOICE_ID)
            .to_string();

        let result = self.convert(&voice_id, request.text).await;

        // Instant clones count against the account's voice slots; always
        // delete ours before surfacing the result.
        if let Some(voice_id) = cloned_voice {
            self.delete_voice(&voice_id).await;
        }

        result
    }

    async fn convert(&self, voice_id: &str, text: &str) -> Result<Vec<u8>, EngineError> {
        let response = self
            .http
            .post(format!(
                "{}/v1/text-to-speech/{voice_id}?output_format=pcm_24000",
                self.base_url
            ))
            .timeout(self.timeout)
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.model_id,
            }))
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), body));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;
        Ok(pcm16_to_wav(&pcm, PCM_SAMPLE_RATE))
    }

    /// Instant voice clone from reference audio. Failure falls back to the
    /// preset voice rather than failing the job.
    async fn clone_voice(&self, speaker: &std::path::Path) -> Option<String> {
        let bytes = tokio::fs::read(speaker).await.ok()?;
        let form = reqwest::multipart::Form::new()
            .text("name", format!("voxdub_clone_{}", std::process::id()))
            .part(
                "files",
                reqwest::multipart::Part::bytes(bytes).file_name("speaker.wav"),
            );

        let response = self
            .http
            .post(format!("{}/v1/voices/ivc/create", self.base_url))
            .timeout(self.timeout)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .ok()?;

        if !response.status().is_success() {
            tracing::warn!(
                http_status = %response.status().as_u16(),
                "voice_clone_failed_using_default"
            );
            return None;
        }
        let created: CreatedVoice = response.json().await.ok()?;
        Some(created.voice_id)
    }

    async fn delete_voice(&self, voice_id: &str) {
        let result = self
            .http
            .delete(format!("{}/v1/voices/{voice_id}", self.base_url))
            .timeout(Duration::from_secs(10))
            .header("xi-api-key", &self.api_key)
            .send()
            .await;
        if let Err(err) = result {
            tracing::warn!(error = %err, voice_id, "voice_cleanup_failed");
        }
    }
}
