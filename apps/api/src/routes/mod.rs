pub mod admin;
pub mod ai;
pub mod health;
pub mod public;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};

use crate::errors::AppError;
use crate::rate_limit::enforce_rate_limit;
use crate::state::AppState;

/// Password flows belong to the identity provider; the routes exist so the
/// auth budget is enforced before anything answers.
async fn not_implemented() -> Result<(), AppError> {
    Err(AppError::NotImplemented)
}

pub fn build_router(state: AppState) -> Router {
    let limiters = state.limiters.clone();

    let api = Router::new()
        .route(
            "/api/v1/public/resumes/:slug",
            get(public::handle_public_resume),
        )
        .route(
            "/api/v1/public/resumes/:slug/pdf",
            get(public::handle_public_resume_pdf),
        )
        .route("/api/v1/admin/cache", get(admin::handle_cache_stats))
        .route(
            "/api/v1/admin/cache/:name",
            delete(admin::handle_clear_cache),
        )
        .route_layer(from_fn_with_state(limiters.api, enforce_rate_limit));

    let ai = Router::new()
        .route("/api/v1/ai/:task", post(ai::handle_generate))
        .route_layer(from_fn_with_state(limiters.ai, enforce_rate_limit));

    let auth = Router::new()
        .route("/api/v1/auth/forgot-password", post(not_implemented))
        .route("/api/v1/auth/reset-password", post(not_implemented))
        .route_layer(from_fn_with_state(limiters.auth, enforce_rate_limit));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(api)
        .merge(ai)
        .merge(auth)
        .with_state(state)
}
