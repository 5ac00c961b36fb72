//! AI-assisted content endpoints. Generation itself is the hosted model's job;
//! this layer validates input, budgets calls (ai limiter) and caches outputs.

use std::fmt;
use std::str::FromStr;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::errors::{AppError, FieldIssue};
use crate::state::AppState;

const MAX_INPUT_CHARS: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiTask {
    BulletPoints,
    CoverLetter,
    AtsScore,
    JobMatch,
}

impl AiTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiTask::BulletPoints => "bullet_points",
            AiTask::CoverLetter => "cover_letter",
            AiTask::AtsScore => "ats_score",
            AiTask::JobMatch => "job_match",
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AiTask::BulletPoints => {
                "You write resume bullet points. Return 3 to 5 bullets, one per line, each \
                 starting with '- ', an action verb, and a measurable result where the input \
                 supports one. Never invent facts."
            }
            AiTask::CoverLetter => {
                "You write concise cover letters (under 350 words) from a resume and an \
                 optional job description. Use only facts present in the input."
            }
            AiTask::AtsScore => {
                "You review resumes the way an applicant tracking system would. Return a score \
                 from 0 to 100 on the first line, then the missing keywords and formatting \
                 problems as a short list."
            }
            AiTask::JobMatch => {
                "You compare a resume against a job description. Return a match percentage on \
                 the first line, then strengths and gaps as two short lists."
            }
        }
    }
}

impl fmt::Display for AiTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiTask {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullet_points" => Ok(AiTask::BulletPoints),
            "cover_letter" => Ok(AiTask::CoverLetter),
            "ats_score" => Ok(AiTask::AtsScore),
            "job_match" => Ok(AiTask::JobMatch),
            other => Err(AppError::NotFound(format!("Unknown AI task '{other}'"))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AiRequest {
    /// Resume text or the experience to turn into bullets.
    pub input: String,
    /// Job description or other supporting text.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AiResponse {
    pub task: AiTask,
    pub output: String,
    pub cached: bool,
}

impl AiRequest {
    fn validate(&self, task: AiTask) -> Result<(), AppError> {
        let mut issues = Vec::new();

        if self.input.trim().is_empty() {
            issues.push(FieldIssue::new("input", "must not be empty"));
        } else if self.input.chars().count() > MAX_INPUT_CHARS {
            issues.push(FieldIssue::new(
                "input",
                format!("must be at most {MAX_INPUT_CHARS} characters"),
            ));
        }

        let context = self.context.as_deref().map(str::trim).unwrap_or_default();
        if context.chars().count() > MAX_INPUT_CHARS {
            issues.push(FieldIssue::new(
                "context",
                format!("must be at most {MAX_INPUT_CHARS} characters"),
            ));
        }
        if task == AiTask::JobMatch && context.is_empty() {
            issues.push(FieldIssue::new(
                "context",
                "a job description is required for job_match",
            ));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidFields(issues))
        }
    }

    fn prompt(&self) -> String {
        match self.context.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("{}\n\n---\n\n{context}", self.input.trim()),
            None => self.input.trim().to_string(),
        }
    }
}

/// Cache key for one generation: the task plus a SHA-256 of model and prompt.
/// The key never contains user text.
pub(crate) fn cache_key(task: AiTask, model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("{task}:{}", hex::encode(hasher.finalize()))
}

/// POST /api/v1/ai/:task
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(task): Path<String>,
    Json(request): Json<AiRequest>,
) -> Result<Json<AiResponse>, AppError> {
    let task: AiTask = task.parse()?;
    request.validate(task)?;

    let prompt = request.prompt();
    let key = cache_key(task, state.llm.model(), &prompt);

    match state.caches.ai.get(&key) {
        Ok(Some(output)) => {
            debug!(%task, key = %key, "ai cache hit");
            return Ok(Json(AiResponse {
                task,
                output,
                cached: true,
            }));
        }
        Ok(None) => {}
        Err(e) => warn!(%task, "ai cache read failed: {e}"),
    }

    let output = state.llm.complete(task.system_prompt(), &prompt).await?;

    if let Err(e) = state.caches.ai.set(key, &output) {
        warn!(%task, "ai output not cached: {e}");
    }

    Ok(Json(AiResponse {
        task,
        output,
        cached: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(input: &str, context: Option<&str>) -> AiRequest {
        AiRequest {
            input: input.to_string(),
            context: context.map(str::to_string),
        }
    }

    fn issues(result: Result<(), AppError>) -> Vec<FieldIssue> {
        match result {
            Err(AppError::InvalidFields(issues)) => issues,
            other => panic!("expected field issues, got {other:?}"),
        }
    }

    #[test]
    fn test_task_parsing() {
        assert_eq!("cover_letter".parse::<AiTask>().unwrap(), AiTask::CoverLetter);
        assert_eq!("ats_score".parse::<AiTask>().unwrap().to_string(), "ats_score");
        assert!(matches!(
            "haiku".parse::<AiTask>(),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_input_rejected() {
        let found = issues(request("   ", None).validate(AiTask::BulletPoints));
        assert_eq!(found, vec![FieldIssue::new("input", "must not be empty")]);
    }

    #[test]
    fn test_oversized_fields_rejected() {
        let long = "x".repeat(MAX_INPUT_CHARS + 1);
        let found = issues(request(&long, Some(&long)).validate(AiTask::CoverLetter));
        let fields: Vec<&str> = found.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["input", "context"]);
    }

    #[test]
    fn test_job_match_needs_job_description() {
        let found = issues(request("Rust engineer, 6 years", None).validate(AiTask::JobMatch));
        assert_eq!(found[0].field, "context");
        assert!(request("Rust engineer", Some("Senior Rust role"))
            .validate(AiTask::JobMatch)
            .is_ok());
    }

    #[test]
    fn test_prompt_appends_context() {
        assert_eq!(request(" resume ", None).prompt(), "resume");
        assert_eq!(
            request("resume", Some(" job ")).prompt(),
            "resume\n\n---\n\njob"
        );
    }

    #[test]
    fn test_cache_key_separates_tasks_and_models() {
        let a = cache_key(AiTask::BulletPoints, "m1", "same prompt");
        assert_eq!(a, cache_key(AiTask::BulletPoints, "m1", "same prompt"));
        assert_ne!(a, cache_key(AiTask::CoverLetter, "m1", "same prompt"));
        assert_ne!(a, cache_key(AiTask::BulletPoints, "m2", "same prompt"));
        assert!(a.starts_with("bullet_points:"));
        assert!(!a.contains("same prompt"));
        assert_eq!(a.len(), "bullet_points:".len() + 64);
    }

    #[test]
    fn test_cache_key_does_not_merge_model_into_prompt() {
        assert_ne!(
            cache_key(AiTask::AtsScore, "m1", "2 years of Rust"),
            cache_key(AiTask::AtsScore, "m12", " years of Rust")
        );
    }
}
