//! Access and rate control — API-key auth, per-IP rate limiting, and input
//! sanitisation.

pub mod auth;
pub mod rate_limit;
pub mod sanitize;

use std::sync::Arc;

use crate::config::EngramConfig;

/// Shared state for the security middleware stack.
#[derive(Clone)]
pub struct SecurityState {
    pub config: Arc<EngramConfig>,
    pub limiter: Arc<rate_limit::RateLimiter>,
}

impl SecurityState {
    pub fn new(config: Arc<EngramConfig>) -> Self {
        let limiter = Arc::new(rate_limit::RateLimiter::new(
            config.security.max_requests_per_minute,
            config.security.max_requests_per_hour,
            std::time::Duration::from_secs(config.security.block_duration_secs),
        ));
        Self { config, limiter }
    }
}
