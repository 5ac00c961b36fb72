use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Read-only projection of a published resume, as served on its public URL.
///
/// `content` is the editor's section document, passed through untouched.
/// `pdf_key` is set once the render pool has uploaded a PDF to object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PublicResume {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub template: String,
    pub content: Value,
    pub pdf_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Slugs are lowercase ASCII letters, digits and single hyphens, at most 100 chars.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 100
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
