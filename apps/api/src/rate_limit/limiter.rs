use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::config::{RateLimitPolicy, RateLimitSettings};
use crate::rate_limit::store::RateLimitStore;

/// Endpoint groups with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitCategory {
    Api,
    Ai,
    Auth,
}

impl LimitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitCategory::Api => "api",
            LimitCategory::Ai => "ai",
            LimitCategory::Auth => "auth",
        }
    }
}

impl fmt::Display for LimitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one `check_limit` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
    #[serde(skip)]
    pub retry_after: Duration,
}

/// Fixed-window limiter for one category.
///
/// The first call for an identifier opens a window; every call inside it
/// counts, and calls past `max_requests` fail until the window closes.
/// Store failures let the request through.
pub struct RateLimiter {
    category: LimitCategory,
    policy: RateLimitPolicy,
    store: Arc<dyn RateLimitStore>,
    per_user: bool,
}

impl RateLimiter {
    pub fn new(
        category: LimitCategory,
        policy: RateLimitPolicy,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            category,
            policy,
            store,
            per_user: false,
        }
    }

    /// Count requests per `x-user-email` when the header is present.
    /// Enable only behind a gateway that strips the header from client traffic.
    pub fn per_user(mut self, enabled: bool) -> Self {
        self.per_user = enabled;
        self
    }

    pub fn category(&self) -> LimitCategory {
        self.category
    }

    pub fn is_per_user(&self) -> bool {
        self.per_user
    }

    pub async fn check_limit(&self, identifier: &str) -> RateLimitDecision {
        let key = format!("ratelimit:{}:{identifier}", self.category);
        let max = self.policy.max_requests;

        match self.store.hit(&key, &self.policy).await {
            Ok(window) => {
                let success = window.count <= max;
                RateLimitDecision {
                    success,
                    limit: max,
                    remaining: max.saturating_sub(window.count),
                    reset_time: wall_clock_after(window.reset_after),
                    retry_after: if success {
                        Duration::ZERO
                    } else {
                        window.reset_after
                    },
                }
            }
            Err(e) => {
                warn!(
                    category = %self.category,
                    backend = self.store.backend(),
                    "rate limit check failed, allowing request: {e}"
                );
                RateLimitDecision {
                    success: true,
                    limit: max,
                    remaining: max,
                    reset_time: wall_clock_after(self.policy.window),
                    retry_after: Duration::ZERO,
                }
            }
        }
    }
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// One limiter per category over a shared store.
#[derive(Clone)]
pub struct RateLimiters {
    pub api: Arc<RateLimiter>,
    pub ai: Arc<RateLimiter>,
    pub auth: Arc<RateLimiter>,
    pub store: Arc<dyn RateLimitStore>,
}

impl RateLimiters {
    pub fn new(settings: &RateLimitSettings, store: Arc<dyn RateLimitStore>) -> Self {
        let limiter = |category, policy| RateLimiter::new(category, policy, store.clone());
        Self {
            api: Arc::new(limiter(LimitCategory::Api, settings.api)),
            ai: Arc::new(
                limiter(LimitCategory::Ai, settings.ai).per_user(settings.trust_user_email_header),
            ),
            auth: Arc::new(limiter(LimitCategory::Auth, settings.auth)),
            store: store.clone(),
        }
    }
}
