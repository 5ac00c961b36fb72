//! Public resume pages. Both routes read through the process caches:
//! resume documents from Postgres, rendered PDFs from object storage.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tracing::{debug, warn};

use crate::errors::AppError;
use crate::models::resume::{is_valid_slug, PublicResume};
use crate::state::AppState;

/// GET /api/v1/public/resumes/:slug
pub async fn handle_public_resume(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicResume>, AppError> {
    let resume = load_public_resume(&state, &slug).await?;
    Ok(Json(resume))
}

/// GET /api/v1/public/resumes/:slug/pdf
///
/// Serves the PDF the render pool uploaded for this resume. Resumes that
/// have not been rendered yet answer 404.
pub async fn handle_public_resume_pdf(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let resume = load_public_resume(&state, &slug).await?;
    let pdf_key = resume
        .pdf_key
        .ok_or_else(|| AppError::NotFound(format!("No PDF has been rendered for {slug}")))?;

    let pdf = match state.caches.pdfs.get(&pdf_key) {
        Some(pdf) => {
            debug!(key = %pdf_key, "pdf cache hit");
            pdf
        }
        None => {
            let pdf = fetch_pdf(&state, &pdf_key).await?;
            state.caches.pdfs.set(pdf_key.clone(), pdf.clone());
            pdf
        }
    };

    let disposition = format!("inline; filename=\"{slug}.pdf\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

/// Cache first, then Postgres. A cache fault is logged and treated as a miss.
async fn load_public_resume(state: &AppState, slug: &str) -> Result<PublicResume, AppError> {
    if !is_valid_slug(slug) {
        return Err(AppError::Validation(format!("'{slug}' is not a valid resume slug")));
    }

    match state.caches.resumes.get(slug) {
        Ok(Some(resume)) => {
            debug!(slug, "resume cache hit");
            return Ok(resume);
        }
        Ok(None) => {}
        Err(e) => warn!(slug, "resume cache read failed, falling back to database: {e}"),
    }

    let resume = sqlx::query_as::<_, PublicResume>(
        r#"
        SELECT id, slug, title, template, content, pdf_key, updated_at
        FROM resumes
        WHERE slug = $1 AND is_public = TRUE
        "#,
    )
    .bind(slug)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Resume {slug} not found")))?;

    if let Err(e) = state.caches.resumes.set(slug, &resume) {
        warn!(slug, "resume not cached: {e}");
    }

    Ok(resume)
}

async fn fetch_pdf(state: &AppState, key: &str) -> Result<Bytes, AppError> {
    let object = state
        .s3
        .get_object()
        .bucket(&state.config.s3_bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| {
            if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                AppError::NotFound(format!("Rendered PDF {key} is missing"))
            } else {
                AppError::S3(format!("get s3://{}/{key} failed: {e}", state.config.s3_bucket))
            }
        })?;

    let body = object
        .body
        .collect()
        .await
        .map_err(|e| AppError::S3(format!("reading s3://{}/{key} failed: {e}", state.config.s3_bucket)))?;

    Ok(body.into_bytes())
}
