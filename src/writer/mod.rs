//! C10: the pipeline's core loop. For each chapter in C6-ordered sequence,
//! and for each idea in that chapter's `IdeaList`, invokes C5 through C8's
//! context and appends the resulting prose to the chapter record.
//!
//! Generalizes the teacher's single `Chapter::generate` call
//! (`book/chapter.rs`) into the idea-by-idea loop of §4.10, renaming the
//! teacher's per-chapter sub-unit ("Scene") to "Section" per the glossary,
//! and sourcing context from C8 instead of a flat
//! `previous_chapters_text` string the teacher rebuilt by concatenation
//! on every call.

use crate::context::{ContextManager, SectionPosition};
use crate::error::{BookGeneratorError, Result};
use crate::llm::Invoker;
use crate::prompt_vars;
use crate::prompts::Prompts;
use crate::state::{GenerationStateManager, GenerationStatus};
use tracing::warn;

/// Minimum accepted section length (§9 open question: legacy code
/// "marks" short sections but never consumes the mark downstream). This
/// rewrite resolves that question by logging the short section and not
/// tracking a mark that nothing reads (see DESIGN.md).
const SHORT_SECTION_FLOOR: usize = 200;

#[derive(Debug, Clone)]
pub struct WrittenChapter {
    pub key: String,
    pub title: String,
    pub sections: Vec<String>,
    pub summary: String,
}

/// Writes every chapter in `ordered_chapters`, in order, each chapter's
/// ideas in order. Chapter-N is fully finalized (summary stored) before
/// chapter-(N+1) begins (§5 ordering guarantees).
pub async fn write_book(
    invoker: &Invoker,
    context: &mut ContextManager,
    state: &GenerationStateManager,
    framework: &str,
    ordered_chapters: &[(String, String)],
    ideas_by_chapter: &[(String, Vec<String>)],
) -> Result<Vec<WrittenChapter>> {
    let mut written = Vec::with_capacity(ordered_chapters.len());
    let total_chapters = ordered_chapters.len();

    for (chapter_index, (key, description)) in ordered_chapters.iter().enumerate() {
        context.register_chapter(key, description, "");

        let ideas = ideas_by_chapter
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, ideas)| ideas.as_slice())
            .unwrap_or(&[]);

        state.transition(GenerationStatus::WritingBook, |s| {
            s.current_chapter = Some(key.clone());
            s.chapter_count = total_chapters;
            s.progress = progress_for(chapter_index, 0, ideas.len().max(1), total_chapters);
        })?;

        for (idea_index, idea) in ideas.iter().enumerate() {
            let position = section_position(idea_index, ideas.len());
            let prose = write_one_section(invoker, context, framework, key, chapter_index, position, idea).await?;
            context.append_section(key, &prose).await;

            state.transition(GenerationStatus::WritingBook, |s| {
                s.current_chapter = Some(key.clone());
                s.progress = progress_for(chapter_index, idea_index + 1, ideas.len().max(1), total_chapters);
            })?;
        }

        let summary = context.finalize_chapter(key).await;
        let sections = context.chapter_record(key).map(|r| r.sections.clone()).unwrap_or_default();

        state.transition(GenerationStatus::ChapterComplete, |s| {
            s.current_chapter = Some(key.clone());
        })?;

        written.push(WrittenChapter { key: key.clone(), title: description.clone(), sections, summary });

        if chapter_index + 1 < total_chapters {
            state.transition(GenerationStatus::WritingBook, |_| {})?;
        }
    }

    state.transition(GenerationStatus::WritingComplete, |_| {})?;
    Ok(written)
}

fn section_position(idea_index: usize, total_ideas: usize) -> SectionPosition {
    if idea_index == 0 {
        SectionPosition::Start
    } else if total_ideas > 0 && idea_index == total_ideas - 1 {
        SectionPosition::End
    } else {
        SectionPosition::Middle
    }
}

fn progress_for(chapter_index: usize, ideas_done: usize, ideas_total: usize, total_chapters: usize) -> u8 {
    if total_chapters == 0 {
        return 0;
    }
    let chapter_fraction = chapter_index as f64 / total_chapters as f64;
    let within_chapter = (ideas_done as f64 / ideas_total.max(1) as f64) / total_chapters as f64;
    (((chapter_fraction + within_chapter) * 100.0).min(100.0)) as u8
}

/// Invokes C5 for one section, applying the local recovery rules of §4.10:
/// an empty response gets one retry with a simplified prompt; a too-short
/// response is accepted and logged, not escalated.
async fn write_one_section(
    invoker: &Invoker,
    context: &ContextManager,
    framework: &str,
    key: &str,
    chapter_index: usize,
    position: SectionPosition,
    idea: &str,
) -> Result<String> {
    let ctx = context.get_context_for_section(chapter_index + 1, position, key);
    let chapter_number = (chapter_index + 1).to_string();
    let vars = prompt_vars! {
        "framework" => framework,
        "previous_chapters_summary" => ctx.previous_chapters_summary.as_str(),
        "current_chapter_summary" => ctx.current_chapter_summary.as_str(),
        "position" => position.as_str(),
        "chapter_number" => chapter_number.as_str(),
        "idea" => idea,
    };

    let outcome = invoker.invoke("section", &Prompts::section(), &vars).await?;

    let prose = if outcome.answer.trim().is_empty() {
        warn!(key, idea, "empty section response, retrying with a simplified prompt");
        let retry_vars = prompt_vars! {"idea" => idea, "framework" => framework};
        let retried = invoker.invoke("section_retry", &Prompts::section_simplified(), &retry_vars).await?;
        if retried.answer.trim().is_empty() {
            return Err(BookGeneratorError::MalformedResponse(format!(
                "section for idea \"{idea}\" was empty even after a simplified retry"
            )));
        }
        retried.answer
    } else {
        outcome.answer
    };

    if prose.chars().count() < SHORT_SECTION_FLOOR {
        warn!(key, idea, len = prose.chars().count(), "section shorter than the configured floor, accepting as-is");
    }

    Ok(prose)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_idea_is_start_last_is_end_rest_are_middle() {
        assert_eq!(section_position(0, 4), SectionPosition::Start);
        assert_eq!(section_position(1, 4), SectionPosition::Middle);
        assert_eq!(section_position(2, 4), SectionPosition::Middle);
        assert_eq!(section_position(3, 4), SectionPosition::End);
    }

    #[test]
    fn single_idea_chapter_is_both_start_and_end_start_wins() {
        assert_eq!(section_position(0, 1), SectionPosition::Start);
    }

    #[test]
    fn progress_is_monotonic_across_chapters_and_ideas() {
        let mut last = 0u8;
        for chapter in 0..3 {
            for idea in 1..=4 {
                let p = progress_for(chapter, idea, 4, 3);
                assert!(p >= last, "progress went backwards: {p} < {last}");
                last = p;
            }
        }
        assert!(last <= 100);
    }
}
