//! Per-client rate limiting
//!
//! Each client IP gets its own governor limiter that admits
//! `rate_limit_requests` per `rate_limit_window`, with the whole window
//! available as a burst. A client idle for a full window has a replenished
//! quota, so its limiter is dropped on the next sweep.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Limiter checks between idle sweeps.
const SWEEP_EVERY: u64 = 1024;

struct ClientLimiter {
    limiter: DirectRateLimiter,
    /// Milliseconds since `RateLimitState::started`
    last_seen_ms: AtomicU64,
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    enabled: bool,
    requests: NonZeroU32,
    quota: Quota,
    idle_after: Duration,
    started: Instant,
    checks: Arc<AtomicU64>,
    limiters: Arc<DashMap<IpAddr, Arc<ClientLimiter>>>,
}

impl RateLimitState {
    pub fn new(config: &ApiConfig) -> Self {
        let requests = NonZeroU32::new(config.rate_limit_requests).unwrap_or(NonZeroU32::MIN);
        let period = config.rate_limit_window / requests.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_minute(requests))
            .allow_burst(requests);

        Self {
            enabled: config.rate_limit_enabled,
            requests,
            quota,
            idle_after: config.rate_limit_window,
            started: Instant::now(),
            checks: Arc::new(AtomicU64::new(0)),
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<ClientLimiter> {
        let client = self
            .limiters
            .entry(ip)
            .or_insert_with(|| {
                Arc::new(ClientLimiter {
                    limiter: RateLimiter::direct(self.quota),
                    last_seen_ms: AtomicU64::new(0),
                })
            })
            .clone();
        client.last_seen_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        client
    }

    /// Drop limiters for clients idle longer than one window.
    ///
    /// Returns how many were removed.
    pub fn evict_idle(&self) -> usize {
        let now = self.elapsed_ms();
        let idle_ms = u64::try_from(self.idle_after.as_millis()).unwrap_or(u64::MAX);
        let before = self.limiters.len();
        self.limiters
            .retain(|_, client| now.saturating_sub(client.last_seen_ms.load(Ordering::Relaxed)) < idle_ms);
        let removed = before.saturating_sub(self.limiters.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.limiters.len(), "Evicted idle rate limiters");
        }
        removed
    }

    fn maybe_sweep(&self) {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.evict_idle();
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.limiters.len()
    }
}

/// Rejection returned once a client has used up its window.
#[derive(Debug)]
pub struct RateLimitError {
    /// Seconds until the next request would be admitted
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let error = ApiError::too_many_requests(self.retry_after);
        tracing::warn!(retry_after = self.retry_after, "Rate limit exceeded");

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(error.to_envelope())).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("retry-after"),
            HeaderValue::from_str(&self.retry_after.to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("60")),
        );
        response
    }
}

/// Client IP, honoring proxy headers before the socket address.
pub fn extract_client_ip(request: &Request, fallback: IpAddr) -> IpAddr {
    if let Some(forwarded_for) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded_for.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse() {
                return ip;
            }
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
    {
        if let Ok(ip) = real_ip.trim().parse() {
            return ip;
        }
    }

    fallback
}

/// Rate limiting middleware.
///
/// Admitted responses carry `x-ratelimit-limit`. Rejected requests get a
/// 429 envelope with `retry-after`.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.enabled {
        return Ok(next.run(request).await);
    }

    // Absent when the router is driven without a socket, as in tests.
    let socket_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let ip = extract_client_ip(&request, socket_ip);

    state.maybe_sweep();
    match state.limiter_for(ip).limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            response.headers_mut().insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(state.requests.get()),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            Err(RateLimitError { retry_after })
        }
    }
}
