// Fixed-window rate limiting per client, with independent api / ai / auth budgets.
// Counting lives behind `RateLimitStore`: in-process by default, Redis when
// REDIS_URL is set so replicas share windows.

pub mod identity;
pub mod limiter;
pub mod middleware;
pub mod redis_store;
pub mod store;

pub use limiter::RateLimiters;
pub use middleware::enforce_rate_limit;
pub use redis_store::RedisRateLimitStore;
pub use store::{InMemoryRateLimitStore, RateLimitStore};
