//! Operator endpoints for the process caches. Guarded by `ADMIN_TOKEN`.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use tracing::info;

use crate::cache::registry::NamedCacheStats;
use crate::cache::AppCaches;
use crate::errors::AppError;
use crate::state::AppState;

/// GET /api/v1/admin/cache
pub async fn handle_cache_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<NamedCacheStats>>, AppError> {
    require_admin(&headers, state.config.admin_token.as_deref())?;
    Ok(Json(state.caches.stats()))
}

/// DELETE /api/v1/admin/cache/:name
pub async fn handle_clear_cache(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    require_admin(&headers, state.config.admin_token.as_deref())?;

    if !state.caches.clear(&name) {
        return Err(AppError::NotFound(format!(
            "Unknown cache '{name}'; expected one of {}",
            AppCaches::NAMES.join(", ")
        )));
    }

    info!(cache = %name, "cache cleared by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// 403 when no admin token is configured, 401 when the bearer token is wrong.
fn require_admin(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AppError> {
    let expected = expected.ok_or(AppError::Forbidden)?;

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}
