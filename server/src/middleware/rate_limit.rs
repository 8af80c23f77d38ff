use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web,
};
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::AppError;

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket for a single client. Refills continuously up to `burst`.
struct TokenBucket {
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                last_refill: now,
            }),
        }
    }

    fn try_consume(&self, per_second: f64, burst: f64, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * per_second).min(burst);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Idle for at least `idle` and refilled back to capacity by `now`.
    fn is_evictable(&self, per_second: f64, burst: f64, idle: Duration, now: Instant) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(state.last_refill);
        elapsed >= idle && state.tokens + elapsed.as_secs_f64() * per_second >= burst
    }
}

/// Per-client admission control. The map is locked only to look up or insert
/// a bucket; each decision then runs under that bucket's own lock.
#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<DashMap<String, Arc<TokenBucket>>>,
    per_second: f64,
    burst: f64,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(per_second: f64, burst: u32) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            per_second,
            burst: f64::from(burst),
            enabled: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            Self::new(config.per_second, config.burst)
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn admit(&self, client: &str) -> bool {
        self.admit_at(client, Instant::now())
    }

    fn admit_at(&self, client: &str, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let existing = self.buckets.get(client).map(|bucket| Arc::clone(bucket.value()));
        let bucket = match existing {
            Some(bucket) => bucket,
            None => Arc::clone(
                self.buckets
                    .entry(client.to_string())
                    .or_insert_with(|| Arc::new(TokenBucket::full(self.burst, now)))
                    .value(),
            ),
        };

        bucket.try_consume(self.per_second, self.burst, now)
    }

    /// Drops buckets untouched for at least `idle` that have refilled to
    /// capacity. Returns how many were removed.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        self.evict_idle_at(idle, Instant::now())
    }

    fn evict_idle_at(&self, idle: Duration, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_evictable(self.per_second, self.burst, idle, now));
        before.saturating_sub(self.buckets.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5.0, 20)
    }
}

/// First `X-Forwarded-For` entry, then the peer address, then `"unknown"`.
pub fn client_identity(req: &ServiceRequest) -> String {
    let forwarded = req
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty());

    if let Some(first) = forwarded {
        return first.to_string();
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn rate_limit_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let Some(rate_limiter) = req.app_data::<web::Data<RateLimiter>>().cloned() else {
        let err = AppError::Internal("rate limiter not available".to_string());
        return Ok(req.error_response(err).map_into_right_body());
    };

    let client = client_identity(&req);
    if !rate_limiter.admit(&client) {
        log::warn!("Rate limit exceeded for client: {}", client);
        return Ok(req.error_response(AppError::RateLimited).map_into_right_body());
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_refills_over_time() {
        let limiter = RateLimiter::new(5.0, 2);
        let start = Instant::now();

        assert!(limiter.admit_at("c", start));
        assert!(limiter.admit_at("c", start));
        assert!(!limiter.admit_at("c", start));

        // 200ms at 5/s refills exactly one token.
        assert!(limiter.admit_at("c", start + Duration::from_millis(200)));
        assert!(!limiter.admit_at("c", start + Duration::from_millis(200)));
    }

    #[test]
    fn test_eviction_waits_for_full_refill() {
        let limiter = RateLimiter::new(1.0, 4);
        let start = Instant::now();
        for _ in 0..4 {
            assert!(limiter.admit_at("c", start));
        }

        let idle = Duration::from_secs(2);
        // Idle long enough but only half refilled.
        assert_eq!(limiter.evict_idle_at(idle, start + Duration::from_secs(2)), 0);
        assert_eq!(limiter.evict_idle_at(idle, start + Duration::from_secs(4)), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let limiter = RateLimiter::new(5.0, 3);
        let start = Instant::now();
        assert!(limiter.admit_at("c", start));

        let later = start + Duration::from_secs(60);
        for _ in 0..3 {
            assert!(limiter.admit_at("c", later));
        }
        assert!(!limiter.admit_at("c", later));
    }

    #[test]
    fn test_disabled_admits_everything() {
        let limiter = RateLimiter::disabled();
        for _ in 0..1000 {
            assert!(limiter.admit("c"));
        }
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_client_identity_prefers_forwarded_for() {
        let req = actix_web::test::TestRequest::default()
            .insert_header((FORWARDED_FOR, " 10.0.0.7 , 192.168.1.1"))
            .peer_addr("127.0.0.1:4000".parse().unwrap())
            .to_srv_request();
        assert_eq!(client_identity(&req), "10.0.0.7");

        let req = actix_web::test::TestRequest::default()
            .peer_addr("127.0.0.1:4000".parse().unwrap())
            .to_srv_request();
        assert_eq!(client_identity(&req), "127.0.0.1");

        let req = actix_web::test::TestRequest::default().to_srv_request();
        assert_eq!(client_identity(&req), UNKNOWN_CLIENT);
    }
}
