use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock, state::keyed::DefaultKeyedStateStore, Quota, RateLimiter,
};

use crate::error::ApiError;

type KeyedLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Sliding per-address quota over the inbound API. Jobs themselves are
/// never throttled after acceptance.
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<KeyedLimiter>,
}

impl RateLimitState {
    pub fn new(requests: u32, window: Duration) -> Self {
        let requests = NonZeroU32::new(requests.max(1)).unwrap();
        let period = window / requests.get();
        let quota = Quota::with_period(period.max(Duration::from_millis(1)))
            .expect("nonzero rate-limit period")
            .allow_burst(requests);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    pub fn check(&self, addr: IpAddr) -> bool {
        self.limiter.check_key(&addr).is_ok()
    }
}

/// Proxy-aware client address: first X-Forwarded-For hop, else the socket
/// peer.
pub fn client_ip(request: &Request) -> IpAddr {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::from([0, 0, 0, 0]))
}

pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&request);
    if !state.check(ip) {
        tracing::warn!(client = %ip, "rate_limit_exceeded");
        return Err(ApiError::TooManyRequests);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exhausts_and_recovers_per_key() {
        let state = RateLimitState::new(3, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(state.check(a));
        assert!(state.check(a));
        assert!(state.check(a));
        assert!(!state.check(a), "fourth call within the window is rejected");
        assert!(state.check(b), "other addresses are unaffected");
    }
}
