// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-window request limiter keyed by client IP.
//!
//! Window state lives in a bounded LRU map, so a flood of distinct addresses
//! evicts the least recently seen clients instead of growing memory.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use lru::LruCache;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// Distinct client addresses tracked at once.
pub const DEFAULT_CAPACITY: usize = 10_000;

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimiter {
    windows: Mutex<LruCache<IpAddr, Window>>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            windows: Mutex::new(LruCache::new(capacity)),
            window,
            max_requests,
        }
    }

    /// Count one request from `ip`; `false` once the window's ceiling is hit.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let Ok(mut windows) = self.windows.lock() else {
            // A poisoned lock only loses counters; keep serving
            return true;
        };

        match windows.get_mut(&ip) {
            Some(entry) if now.duration_since(entry.started_at) < self.window => {
                if entry.count >= self.max_requests {
                    return false;
                }
                entry.count += 1;
                true
            }
            _ => {
                windows.put(
                    ip,
                    Window {
                        started_at: now,
                        count: 1,
                    },
                );
                self.max_requests > 0
            }
        }
    }
}

/// Middleware applying the shared [`RateLimiter`] to every routed request.
pub async fn enforce(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !state.rate_limiter.check(ip) {
        warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        return ApiError::rate_limited().into_response();
    }
    next.run(request).await
}
