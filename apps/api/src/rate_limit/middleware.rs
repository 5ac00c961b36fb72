//! Axum middleware that charges each request to a category limiter.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::errors::AppError;
use crate::rate_limit::identity::client_identifier;
use crate::rate_limit::limiter::{RateLimitDecision, RateLimiter};

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Attach with `middleware::from_fn_with_state(limiter, enforce_rate_limit)`.
///
/// Rejected requests never reach the handler. Both outcomes carry the
/// `x-ratelimit-*` headers; rejections also carry `retry-after`.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let identifier = client_identifier(request.headers(), peer, limiter.is_per_user());

    let decision = limiter.check_limit(&identifier).await;

    let mut response = if decision.success {
        next.run(request).await
    } else {
        debug!(
            category = %limiter.category(),
            identifier = %identifier,
            "request rejected by rate limiter"
        );
        AppError::RateLimited {
            retry_after_secs: decision.retry_after.as_secs().max(1),
        }
        .into_response()
    };

    apply_headers(response.headers_mut(), &decision);
    response
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_time.timestamp()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::RateLimitPolicy;
    use crate::rate_limit::limiter::LimitCategory;
    use crate::rate_limit::store::InMemoryRateLimitStore;

    fn app(max_requests: u32) -> Router {
        let limiter = Arc::new(RateLimiter::new(
            LimitCategory::Api,
            RateLimitPolicy::new(max_requests, Duration::from_secs(60)),
            Arc::new(InMemoryRateLimitStore::new()),
        ));
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route_layer(middleware::from_fn_with_state(limiter, enforce_rate_limit))
    }

    fn request_from(ip: &str) -> Request {
        axum::http::Request::builder()
            .uri("/ping")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_allowed_request_reaches_handler_with_headers() {
        let response = app(3).oneshot(request_from("203.0.113.7")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&LIMIT_HEADER], "3");
        assert_eq!(response.headers()[&REMAINING_HEADER], "2");
        assert!(response.headers().contains_key(&RESET_HEADER));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_request_past_limit_gets_429() {
        let app = app(2);
        for _ in 0..2 {
            let response = app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&REMAINING_HEADER], "0");
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_rotating_user_header_does_not_reset_budget() {
        let limiter = Arc::new(RateLimiter::new(
            LimitCategory::Ai,
            RateLimitPolicy::new(1, Duration::from_secs(60)),
            Arc::new(InMemoryRateLimitStore::new()),
        ));
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route_layer(middleware::from_fn_with_state(limiter, enforce_rate_limit));
        let with_email = |email: &str| {
            axum::http::Request::builder()
                .uri("/ping")
                .header("x-forwarded-for", "203.0.113.7")
                .header(crate::rate_limit::identity::USER_EMAIL_HEADER, email)
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(with_email("a@example.com")).await.unwrap();
        let second = app.clone().oneshot(with_email("b@example.com")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_other_clients_unaffected() {
        let app = app(1);
        app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
        let blocked = app.clone().oneshot(request_from("203.0.113.7")).await.unwrap();
        let other = app.clone().oneshot(request_from("198.51.100.2")).await.unwrap();

        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(other.status(), StatusCode::OK);
    }
}
