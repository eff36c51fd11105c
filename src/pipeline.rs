//! The linear driver described in §2's "Control flow": a run walks C11's
//! states in order, calling C9 (structure, then ideas), C6 (chapter
//! ordering) and C10 (writing) along the way. This is the orchestration
//! the teacher's `server.rs::run_generation` performs inline against a
//! `JobStatus` struct; here it is lifted out of the HTTP layer so both
//! the façade and the CLI binary can drive it.

use crate::chapters::sort_chapters;
use crate::config::Config;
use crate::context::ContextManager;
use crate::error::Result;
use crate::llm::Invoker;
use crate::plan;
use crate::state::{GenerationStateManager, GenerationStatus};
use crate::writer::write_book;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Request record from the outer pipeline (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub subject: String,
    pub profile: String,
    pub style: String,
    pub genre: String,
    pub model: Option<String>,
    pub output_format: Option<String>,
    pub output_path: Option<String>,
}

/// Output record to the outer pipeline (§6): the accumulated book text
/// (chapter key -> section list) and enough metadata for a downstream
/// formatter. The formatter itself is out of scope (§1).
#[derive(Debug, Clone, Serialize)]
pub struct BookArtifact {
    pub book_id: String,
    pub title: String,
    pub framework: String,
    pub chapters: Vec<(String, Vec<String>)>,
    pub output_format: Option<String>,
    pub output_path: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Runs one full generation against `config`, driving `state` through its
/// legal transitions, and returns the finished artifact. On any
/// unrecoverable error, transitions `state` to `Error` before returning it.
pub async fn run_pipeline(
    mut config: Config,
    request: GenerationRequest,
    book_id: String,
    state: Arc<GenerationStateManager>,
) -> Result<BookArtifact> {
    if let Some(model) = &request.model {
        config.model = model.clone();
    }

    match run_pipeline_inner(&config, &request, &book_id, &state).await {
        Ok(artifact) => Ok(artifact),
        Err(err) => {
            warn!(book_id, error = %err, "generation pipeline failed");
            state.fail(err.to_string());
            Err(err)
        }
    }
}

async fn run_pipeline_inner(
    config: &Config,
    request: &GenerationRequest,
    book_id: &str,
    state: &GenerationStateManager,
) -> Result<BookArtifact> {
    state.transition(GenerationStatus::Starting, |s| {
        s.current_step = "starting generation".to_string();
    })?;

    let invoker = Arc::new(Invoker::new(config.clone()));

    state.transition(GenerationStatus::ConfiguringModel, |s| {
        s.current_step = format!("configuring provider chain: {}", config.provider_chain.join(", "));
    })?;

    state.transition(GenerationStatus::GeneratingStructure, |s| {
        s.current_step = "generating title, framework, and chapter list".to_string();
    })?;

    let title = plan::generate_title(&invoker, &request.subject, &request.genre, &request.profile, &request.style).await?;
    let framework =
        plan::generate_framework(&invoker, &title, &request.subject, &request.genre, &request.profile, &request.style).await?;
    let raw_chapters = plan::generate_chapters(&invoker, &title, &framework).await?;

    state.transition(GenerationStatus::StructureComplete, |s| {
        s.title = Some(title.clone());
        s.current_step = "structure complete".to_string();
    })?;

    let ordering = sort_chapters(raw_chapters.iter().map(|(key, _)| key.as_str()));
    for warning in &ordering.warnings {
        warn!(book_id, warning, "chapter ordering warning");
    }
    let descriptions: std::collections::HashMap<String, String> = raw_chapters.into_iter().collect();
    let ordered_chapters: Vec<(String, String)> = ordering
        .ordered
        .into_iter()
        .map(|key| {
            let description = descriptions.get(&key).cloned().unwrap_or_default();
            (key, description)
        })
        .collect();

    state.transition(GenerationStatus::GeneratingIdeas, |s| {
        s.current_step = "generating per-chapter section ideas".to_string();
        s.chapter_count = ordered_chapters.len();
    })?;

    let mut ideas_by_chapter = Vec::with_capacity(ordered_chapters.len());
    let mut prior_ideas_summary = String::new();
    for (key, description) in &ordered_chapters {
        let ideas = plan::generate_ideas(&invoker, &framework, key, description, &prior_ideas_summary).await?;
        prior_ideas_summary = ideas.join("; ");
        ideas_by_chapter.push((key.clone(), ideas));
    }

    state.transition(GenerationStatus::IdeasComplete, |s| {
        s.current_step = "section ideas complete".to_string();
    })?;

    let mut context = ContextManager::new(framework.clone(), config.context.clone(), Some(invoker.clone()))
        .with_segment_config(config.segment.clone());
    let written = write_book(&invoker, &mut context, state, &framework, &ordered_chapters, &ideas_by_chapter).await?;

    state.transition(GenerationStatus::SavingDocument, |s| {
        s.current_step = "saving document".to_string();
        s.output_format = request.output_format.clone();
        s.file_path = request.output_path.clone();
    })?;

    let artifact = BookArtifact {
        book_id: book_id.to_string(),
        title: title.clone(),
        framework,
        chapters: written.into_iter().map(|c| (c.key, c.sections)).collect(),
        output_format: request.output_format.clone(),
        output_path: request.output_path.clone(),
        generated_at: Utc::now(),
    };

    state.transition(GenerationStatus::Complete, |s| {
        s.book_ready = true;
        s.progress = 100;
        s.current_step = "complete".to_string();
    })?;

    let (prompt_tokens, completion_tokens, calls) = invoker.token_tracker().totals();
    info!(book_id, prompt_tokens, completion_tokens, calls, "generation pipeline complete");

    Ok(artifact)
}
