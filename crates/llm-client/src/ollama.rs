use std::time::Duration;

use serde::Deserialize;
use voxdub_interface::EngineError;

use crate::{classify_reqwest, ChatRequest, DEFAULT_LLM_TIMEOUT_SECS};

const PROVIDER: &str = "ollama";

/// Local model host. No credential; the resource gate serializes access
/// when the configured model is GPU-resident.
#[derive(Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
        let prompt = match &request.system {
            Some(system) => format!("{system}\n\n{}", request.user),
            None => request.user.clone(),
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": request.temperature },
            }))
            .send()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest(PROVIDER, e))?;

        if !status.is_success() {
            let message = if EngineError::looks_like_oom(&body) {
                return Err(EngineError::ResourceExhausted { provider: PROVIDER, message: body });
            } else {
                body
            };
            return Err(EngineError::from_status(PROVIDER, status.as_u16(), message));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            EngineError::Malformed { provider: PROVIDER, message: e.to_string() }
        })?;
        Ok(parsed.response)
    }
}
