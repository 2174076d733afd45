use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AuthState {
    enabled: bool,
    allowed_keys: Vec<String>,
}

impl AuthState {
    pub fn new(enabled: bool, allowed_keys: Vec<String>) -> Self {
        if enabled && allowed_keys.is_empty() {
            tracing::warn!("auth_enabled_without_keys_all_requests_will_be_rejected");
        }
        Self { enabled, allowed_keys }
    }
}

/// Header-key check on every job route when enabled; values are compared,
/// never logged.
pub async fn require_api_key(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth.enabled {
        return Ok(next.run(request).await);
    }

    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if auth.allowed_keys.iter().any(|allowed| allowed == key) => {
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::Unauthorized),
    }
}
