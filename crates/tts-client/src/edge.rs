use std::time::Duration;

use voxdub_interface::{EngineError, Language};

use crate::{classify_reqwest, SynthesisRequest, DEFAULT_TTS_TIMEOUT_SECS};

const PROVIDER: &str = "edge";

/// Default neural voice per target language.
pub fn edge_voice_for(language: Language) -> &'static str {
    match language {
        Language::Ko => "ko-KR-SunHiNeural",
        Language::Ru => "ru-RU-SvetlanaNeural",
        Language::Ja => "ja-JP-NanamiNeural",
        Language::Zh => "zh-CN-XiaoxiaoNeural",
        Language::Es => "es-ES-ElviraNeural",
        Language::Fr => "fr-FR-DeniseNeural",
        Language::De => "de-DE-KatjaNeural",
        Language::It => "it-IT-ElsaNeural",
        Language::Pt => "pt-BR-FranciscaNeural",
        Language::Nl => "nl-NL-ColetteNeural",
        Language::Pl => "pl-PL-ZofiaNeural",
        Language::Tr => "tr-TR-EmelNeural",
        Language::Vi => "vi-VN-HoaiMyNeural",
        Language::Th => "th-TH-PremwadeeNeural",
        Language::Ar => "ar-SA-ZariyahNeural",
        Language::Hi => "hi-IN-SwaraNeural",
        Language::En | Language::Auto => "en-US-AriaNeural",
    }
}

/// Adapter for the edge speech gateway: keyless neural voices, no
/// cloning. Terminates every TTS fallback chain because it cannot run out
/// of credentials.
#[derive(Debug, Clone)]
pub struct EdgeClient {
    http: reqwest::Client,
    base_url: String,
    voice_override: Option<String>,
    timeout: Duration,
}

impl EdgeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            voice_override: None,
            timeout: Duration::from_secs(DEFAULT_TTS_TIMEOUT_SECS),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice_override = Some(voice.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> Result<Vec<u8>, EngineError> {
        let voice = self
            .voice_override
            .as_deref()
            .unwrap_or_else(|| edge_voice_for(request.language));

        let response = self
            .http
            .post(format!("{}/synthesize", self.base_url))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "text": request.text,
                "voice": voice,
                "format": "riff-24khz-16bit-mono-pcm",
            }))
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_table_covers_core_languages() {
        assert_eq!(edge_voice_for(Language::Ko), "ko-KR-SunHiNeural");
        assert_eq!(edge_voice_for(Language::Ru), "ru-RU-SvetlanaNeural");
        assert!(edge_voice_for(Language::Auto).starts_with("en-US"));
    }
}
