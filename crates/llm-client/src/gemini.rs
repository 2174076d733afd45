use std::time::Duration;

use serde::Deserialize;
use voxdub_interface::EngineError;

use crate::{classify_reqwest, ChatRequest, DEFAULT_LLM_TIMEOUT_SECS};

const PROVIDER: &str = "gemini";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: GEMINI_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
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

    pub(crate) async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.user }],
            }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens.unwrap_or(8192),
            },
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": system }],
            });
        }

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        if !status.is_success() {
            // Gemini reports exhaustion both as 429 and as RESOURCE_EXHAUSTED
            // bodies behind other statuses.
            if status.as_u16() == 429 || EngineError::looks_like_quota(&text) {
                return Err(EngineError::Quota { provider: PROVIDER, message: text });
            }
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), text));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            EngineError::Malformed { provider: PROVIDER, message: e.to_string() }
        })?;

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}
