//! Per-client sliding-window rate limiter.
//!
//! Two windows per client key (normally an IP): requests in the last minute
//! and in the last hour. Breaching the minute limit rejects until the window
//! slides; breaching the hour limit blocks the client for the configured
//! duration. State lives in sharded maps so concurrent workers contend on
//! 1/16th of the key space.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{EngramError, EngramResult};

const SHARDS: usize = 16;
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Default)]
struct ClientWindow {
    hits: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

pub struct RateLimiter {
    shards: Vec<Mutex<HashMap<String, ClientWindow>>>,
    max_per_minute: u32,
    max_per_hour: u32,
    block_duration: Duration,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32, max_per_hour: u32, block_duration: Duration) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            max_per_minute,
            max_per_hour,
            block_duration,
        }
    }

    /// Record a request attempt. Returns `RateLimited` with a retry hint when
    /// either window is full, or the client is currently blocked.
    pub fn check(&self, client: &str) -> EngramResult<()> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> EngramResult<()> {
        // Counter state is disposable; recover from a poisoned shard.
        let mut shard = self
            .shard_for(client)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let window = shard.entry(client.to_string()).or_default();

        if let Some(blocked_until) = window.blocked_until {
            if now < blocked_until {
                return Err(EngramError::RateLimited {
                    retry_after_seconds: seconds_until(now, blocked_until),
                });
            }
            window.blocked_until = None;
        }

        // Drop hits that have left the hour window.
        while let Some(oldest) = window.hits.front() {
            if now.duration_since(*oldest) > HOUR {
                window.hits.pop_front();
            } else {
                break;
            }
        }

        if window.hits.len() >= self.max_per_hour as usize {
            let blocked_until = now + self.block_duration;
            window.blocked_until = Some(blocked_until);
            tracing::warn!(client, "hourly rate limit breached; blocking");
            return Err(EngramError::RateLimited {
                retry_after_seconds: self.block_duration.as_secs(),
            });
        }

        let minute_hits: Vec<Instant> = window
            .hits
            .iter()
            .copied()
            .filter(|hit| now.duration_since(*hit) <= MINUTE)
            .collect();
        if minute_hits.len() >= self.max_per_minute as usize {
            // Retry once the oldest in-window hit slides out.
            if let Some(oldest) = minute_hits.first() {
                return Err(EngramError::RateLimited {
                    retry_after_seconds: seconds_until(now, *oldest + MINUTE),
                });
            }
        }

        window.hits.push_back(now);
        Ok(())
    }

    fn shard_for(&self, client: &str) -> &Mutex<HashMap<String, ClientWindow>> {
        let mut hash: usize = 0;
        for byte in client.bytes() {
            hash = hash.wrapping_mul(31).wrapping_add(byte as usize);
        }
        &self.shards[hash % SHARDS]
    }
}

/// Ceiling of the remaining time in whole seconds, at least 1.
fn seconds_until(now: Instant, later: Instant) -> u64 {
    let remaining = later.saturating_duration_since(now);
    remaining.as_secs().max(1)
}

/// Resolve the client key from proxy headers, falling back to the peer
/// address: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn client_key(headers: &axum::http::HeaderMap, peer: Option<&str>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    peer.unwrap_or("unknown").to_string()
}
