use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::AppState;

pub const WINDOW: Duration = Duration::from_secs(15 * 60);
pub const MAX_REQUESTS: u32 = 100;
pub const AUTH_MAX_REQUESTS: u32 = 20;

/// Authentication-class endpoints get the stricter limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathClass {
    Auth,
    General,
}

impl PathClass {
    fn limit(self) -> u32 {
        match self {
            PathClass::Auth => AUTH_MAX_REQUESTS,
            PathClass::General => MAX_REQUESTS,
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counters keyed by (client identity, path class). The
/// counter resets wholesale at the window boundary, so a burst across
/// the boundary can admit close to twice the nominal limit. Entries are
/// never pruned; the map grows with distinct identities.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<(String, PathClass), WindowEntry>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, identity: &str, class: PathClass) -> Result<(), ApiError> {
        self.check_at(identity, class, Instant::now())
    }

    fn check_at(&self, identity: &str, class: PathClass, now: Instant) -> Result<(), ApiError> {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let entry = windows
            .entry((identity.to_string(), class))
            .and_modify(|entry| {
                if now >= entry.reset_at {
                    entry.count = 0;
                    entry.reset_at = now + WINDOW;
                }
            })
            .or_insert_with(|| WindowEntry {
                count: 0,
                reset_at: now + WINDOW,
            });
        entry.count += 1;
        if entry.count > class.limit() {
            return Err(ApiError::RateLimited);
        }
        Ok(())
    }
}

/// First `x-forwarded-for` entry, or `"anonymous"` when absent.
pub fn client_identity(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "anonymous".to_string())
}

pub fn classify(path: &str) -> PathClass {
    let path = path.trim_end_matches('/');
    if path == "/shares" || path.ends_with("/auth") || path.ends_with("/auth-download") {
        PathClass::Auth
    } else {
        PathClass::General
    }
}

/// Rejects over-limit requests before any handler logic runs.
pub async fn require_within_limits(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(request.headers());
    let class = classify(request.uri().path());
    match state.limiter.check(&identity, class) {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
