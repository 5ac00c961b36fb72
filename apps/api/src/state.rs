use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::cache::AppCaches;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::rate_limit::RateLimiters;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    pub config: Config,
    /// Process-scoped caches, built once in `main`.
    pub caches: Arc<AppCaches>,
    /// Per-category limiters; the router attaches them as middleware.
    pub limiters: RateLimiters,
}
