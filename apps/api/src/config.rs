use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Upper bound for every TTL and window setting (30 days).
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a tunable does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// When set, rate-limit windows live in Redis and are shared across replicas.
    pub redis_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub llm_model: String,
    /// Bearer token for /api/v1/admin. Admin routes are disabled when unset.
    pub admin_token: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub caches: CacheSettings,
    pub rate_limits: RateLimitSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub resume_max_items: usize,
    pub resume_max_bytes: usize,
    pub resume_ttl: Duration,
    pub ai_max_items: usize,
    pub ai_max_bytes: usize,
    pub ai_ttl: Duration,
    pub pdf_max_items: usize,
    pub pdf_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            resume_max_items: 500,
            resume_max_bytes: 8 * 1024 * 1024,
            resume_ttl: Duration::from_secs(300),
            ai_max_items: 1000,
            ai_max_bytes: 16 * 1024 * 1024,
            ai_ttl: Duration::from_secs(3600),
            pdf_max_items: 50,
            pdf_ttl: Duration::from_secs(600),
        }
    }
}

/// Ceiling and window length for one limiter category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub api: RateLimitPolicy,
    pub ai: RateLimitPolicy,
    pub auth: RateLimitPolicy,
    /// Count AI calls per `x-user-email` instead of per IP. Only safe when a
    /// gateway in front of the service strips the header from client requests.
    pub trust_user_email_header: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            api: RateLimitPolicy::new(100, Duration::from_secs(60)),
            ai: RateLimitPolicy::new(10, Duration::from_secs(60)),
            auth: RateLimitPolicy::new(5, Duration::from_secs(15 * 60)),
            trust_user_email_header: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let cache_defaults = CacheSettings::default();
        let caches = CacheSettings {
            resume_max_items: env_or("RESUME_CACHE_MAX_ITEMS", cache_defaults.resume_max_items)?,
            resume_max_bytes: env_or("RESUME_CACHE_MAX_BYTES", cache_defaults.resume_max_bytes)?,
            resume_ttl: env_secs_or("RESUME_CACHE_TTL_SECS", cache_defaults.resume_ttl)?,
            ai_max_items: env_or("AI_CACHE_MAX_ITEMS", cache_defaults.ai_max_items)?,
            ai_max_bytes: env_or("AI_CACHE_MAX_BYTES", cache_defaults.ai_max_bytes)?,
            ai_ttl: env_secs_or("AI_CACHE_TTL_SECS", cache_defaults.ai_ttl)?,
            pdf_max_items: env_or("PDF_CACHE_MAX_ITEMS", cache_defaults.pdf_max_items)?,
            pdf_ttl: env_secs_or("PDF_CACHE_TTL_SECS", cache_defaults.pdf_ttl)?,
        };

        let limit_defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            api: policy_from_env("API", limit_defaults.api)?,
            ai: policy_from_env("AI", limit_defaults.ai)?,
            auth: policy_from_env("AUTH", limit_defaults.auth)?,
            trust_user_email_header: env_or(
                "TRUST_USER_EMAIL_HEADER",
                limit_defaults.trust_user_email_header,
            )?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: optional_env("REDIS_URL"),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            llm_model: optional_env("LLM_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            admin_token: optional_env("ADMIN_TOKEN"),
            port: env_or("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            caches,
            rate_limits,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and blank values are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, optional_env(key).as_deref(), default)
}

fn env_secs_or(key: &str, default: Duration) -> Result<Duration> {
    parse_secs_or(key, optional_env(key).as_deref(), default)
}

fn parse_secs_or(key: &str, raw: Option<&str>, default: Duration) -> Result<Duration> {
    let secs = parse_or(key, raw, default.as_secs())?;
    if secs > MAX_DURATION_SECS {
        bail!("Environment variable '{key}' is {secs}s, above the maximum of {MAX_DURATION_SECS}s");
    }
    Ok(Duration::from_secs(secs))
}

fn policy_from_env(category: &str, default: RateLimitPolicy) -> Result<RateLimitPolicy> {
    Ok(RateLimitPolicy {
        max_requests: env_or(&format!("RATE_LIMIT_{category}_MAX"), default.max_requests)?,
        window: env_secs_or(&format!("RATE_LIMIT_{category}_WINDOW_SECS"), default.window)?,
    })
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
    }
}
