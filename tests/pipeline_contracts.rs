//! Cross-module integration tests for the literal end-to-end scenarios in
//! `spec.md` §8 that don't require a live provider: sanitizer tag-splitting,
//! chapter ordering, context budgeting, and the full state-machine walk
//! from `IDLE` to `COMPLETE`. Per-module edge cases already live in each
//! module's own `#[cfg(test)]` block; this file checks that the pieces
//! compose the way the pipeline actually wires them.

use book_generator::chapters::sort_chapters;
use book_generator::config::ContextConfig;
use book_generator::context::{ContextManager, ContextMode, SectionPosition};
use book_generator::state::{GenerationStateManager, GenerationStatus};
use book_generator::text::{clean, CleanStage, StreamingSanitizer};

#[test]
fn tag_split_across_chunks_literal_scenario() {
    // §8 scenario 1: "Hola <thi" + "nk>idea</think> mundo"
    let mut sanitizer = StreamingSanitizer::new();
    sanitizer.push_chunk("Hola <thi");
    sanitizer.push_chunk("nk>idea</think> mundo");
    sanitizer.flush();

    assert_eq!(sanitizer.answer(), "Hola  mundo");
    assert_eq!(sanitizer.thought(), "idea");

    // Whitespace cleanup collapses the doubled space left by the removed
    // tag only when the WHITESPACE stage runs afterward, per §8's note.
    let collapsed = clean(sanitizer.answer(), &[CleanStage::Whitespace]);
    assert_eq!(collapsed, "Hola  mundo".trim());
}

#[test]
fn chapter_ordering_literal_scenarios() {
    // §8 scenario 2: mixed labels, no warnings.
    let mixed = sort_chapters(["Capítulo 3", "Prólogo", "Capítulo 1", "Epílogo", "Capítulo 2"]);
    assert_eq!(mixed.ordered, vec!["Prólogo", "Capítulo 1", "Capítulo 2", "Capítulo 3", "Epílogo"]);
    assert!(mixed.warnings.is_empty());

    // §8 scenario 3: gap in the arabic sequence.
    let gapped = sort_chapters(["Capítulo 1", "Capítulo 3"]);
    assert_eq!(gapped.ordered, vec!["Capítulo 1", "Capítulo 3"]);
    assert!(gapped.warnings.contains(&"gap at 2".to_string()));
}

#[test]
fn context_budget_enforcement_literal_scenario() {
    // §8 scenario 4: CONTEXT_MAX_SIZE=500, a 400-char framework, three
    // 300-char prior-chapter summaries. Only the most recent ones that
    // fit survive; the framework is always preserved.
    let framework = "F".repeat(400);
    let config = ContextConfig {
        limited_size: 400,
        standard_size: 500,
        max_accumulation: 10_000,
        enable_micro_summaries: false,
        micro_summary_interval: 5,
    };
    let mut manager = ContextManager::new(framework.clone(), config, None).with_mode(ContextMode::Progressive);

    manager.register_chapter("Capítulo 1", "One", "");
    manager.register_chapter("Capítulo 2", "Two", "");
    manager.register_chapter("Capítulo 3", "Three", "");
    manager.register_chapter("Capítulo 4", "Four", "");

    // Set rolling summaries directly (as finalize_chapter would) rather
    // than driving real LLM calls.
    for key in ["Capítulo 1", "Capítulo 2", "Capítulo 3"] {
        // Reach through the public surface: append then finalize without a
        // summarizer falls back to the extractive summary, which for a
        // single 300-char section is that section verbatim.
        futures_test_block_on(manager.append_section(key, &"S".repeat(300)));
        futures_test_block_on(manager.finalize_chapter(key));
    }

    let response = manager.get_context_for_section(4, SectionPosition::Middle, "Capítulo 4");
    assert!(response.budget_len() <= 500, "budget_len={}", response.budget_len());
    assert_eq!(response.framework, framework);
    // Only 100 chars remain after the framework; none of the 300-char
    // prior summaries fit, so the oldest-first drop rule empties the
    // previous-chapters field entirely rather than truncating one in.
    assert!(response.previous_chapters_summary.is_empty());
}

/// Minimal block-on helper so this file doesn't need `#[tokio::test]` just
/// to drive the two async `ContextManager` calls above serially.
fn futures_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(fut)
}

#[test]
fn full_legal_state_chain_from_idle_to_complete() {
    let manager = GenerationStateManager::new();
    let chain = [
        GenerationStatus::Starting,
        GenerationStatus::ConfiguringModel,
        GenerationStatus::GeneratingStructure,
        GenerationStatus::StructureComplete,
        GenerationStatus::GeneratingIdeas,
        GenerationStatus::IdeasComplete,
        GenerationStatus::WritingBook,
        GenerationStatus::ChapterComplete,
        GenerationStatus::WritingComplete,
        GenerationStatus::SavingDocument,
        GenerationStatus::Complete,
    ];

    for status in chain {
        manager.transition(status, |_| {}).unwrap_or_else(|err| panic!("transition to {status:?} failed: {err}"));
    }

    let final_state = manager.current();
    assert_eq!(final_state.status, GenerationStatus::Complete);

    // Complete is terminal: nothing, not even Error, can follow it.
    assert!(manager.transition(GenerationStatus::Error, |_| {}).is_err());
}

#[test]
fn illegal_jump_from_idle_is_rejected_and_state_is_unchanged() {
    // §8 scenario 6.
    let manager = GenerationStateManager::new();
    let result = manager.transition(GenerationStatus::WritingBook, |_| {});
    assert!(result.is_err());
    assert_eq!(manager.current().status, GenerationStatus::Idle);
}
