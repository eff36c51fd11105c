//! C8: hierarchical narrative memory. Answers "what prior context should
//! this section see?" within a character budget, trading one extra LLM
//! call per `micro_summary_interval` sections for staying inside small
//! context windows (§9, "Context manager's three modes").
//!
//! Generalizes the teacher's ad hoc `TemporarySummary::generate_chapter`/
//! `generate_scene`/`generate_content` calls (`book/chapter.rs`), which built
//! one flattened "everything so far" string per call site, into the three
//! explicit modes spec'd here behind one `get_context_for_section` entry
//! point (§9, "modes should be polymorphic... not special-cased at every
//! writer call site").

use crate::chapters::extract_segments;
use crate::config::{ContextConfig, SegmentConfig};
use crate::llm::Invoker;
use crate::prompts::Prompts;
use crate::prompt_vars;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Simple,
    Progressive,
    Intelligent,
}

impl ContextMode {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "simple" => ContextMode::Simple,
            "intelligent" => ContextMode::Intelligent,
            _ => ContextMode::Progressive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionPosition {
    Start,
    Middle,
    End,
}

impl SectionPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionPosition::Start => "start",
            SectionPosition::Middle => "middle",
            SectionPosition::End => "end",
        }
    }
}

/// Held per chapter; created lazily on first reference, never destroyed
/// during a run (invariant i).
#[derive(Debug, Clone)]
pub struct ChapterRecord {
    pub title: String,
    pub rolling_summary: String,
    pub sections: Vec<String>,
    pub entity_hints: HashMap<String, String>,
    pub last_updated: DateTime<Utc>,
    sections_since_last_micro: usize,
}

impl ChapterRecord {
    fn new(title: String, initial_summary: String) -> Self {
        Self {
            title,
            rolling_summary: initial_summary,
            sections: Vec::new(),
            entity_hints: HashMap::new(),
            last_updated: Utc::now(),
            sections_since_last_micro: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextResponse {
    pub framework: String,
    pub previous_chapters_summary: String,
    pub current_chapter_summary: String,
    pub key_entities: HashMap<String, String>,
}

impl ContextResponse {
    /// The budget-relevant length per §8: framework + previous-chapters
    /// summary + current-chapter summary (key_entities is a side map, not
    /// counted against the character budget).
    pub fn budget_len(&self) -> usize {
        self.framework.chars().count()
            + self.previous_chapters_summary.chars().count()
            + self.current_chapter_summary.chars().count()
    }
}

const RECENT_PARAGRAPHS: usize = 3;

/// Not shared across threads; only the pipeline thread mutates it (§5).
pub struct ContextManager {
    framework: String,
    mode: ContextMode,
    config: ContextConfig,
    segment_config: SegmentConfig,
    order: Vec<String>,
    chapters: HashMap<String, ChapterRecord>,
    summarizer: Option<Arc<Invoker>>,
}

impl ContextManager {
    pub fn new(framework: String, config: ContextConfig, summarizer: Option<Arc<Invoker>>) -> Self {
        let mode = ContextMode::from_str_config(if config.enable_micro_summaries { "intelligent" } else { "progressive" });
        Self {
            framework,
            mode,
            config,
            segment_config: SegmentConfig::default(),
            order: Vec::new(),
            chapters: HashMap::new(),
            summarizer,
        }
    }

    pub fn with_mode(mut self, mode: ContextMode) -> Self {
        self.mode = mode;
        self
    }

    /// §4.7: the budget/strategy C7 uses when a chapter's raw section text
    /// would otherwise be too long to hand to a summarization call whole.
    pub fn with_segment_config(mut self, segment_config: SegmentConfig) -> Self {
        self.segment_config = segment_config;
        self
    }

    /// Shrinks `text` to `max_accumulation` characters via C7's segment
    /// extractor before it is sent to a summarization LLM call, so a
    /// chapter with many long sections never blows past the provider's
    /// own context window on a finalize/micro-summary call.
    fn segment_for_summarization(&self, text: &str) -> String {
        extract_segments(text, self.config.max_accumulation, &self.segment_config)
    }

    /// Idempotent: re-registering an existing key is a no-op.
    pub fn register_chapter(&mut self, key: &str, title: &str, initial_summary: &str) {
        if self.chapters.contains_key(key) {
            return;
        }
        self.order.push(key.to_string());
        self.chapters.insert(key.to_string(), ChapterRecord::new(title.to_string(), initial_summary.to_string()));
    }

    /// Appends `section_text` to the chapter's section list. In
    /// `Intelligent` mode, may trigger a micro-summary via C5 once the
    /// section count since the last one crosses `micro_summary_interval`.
    pub async fn append_section(&mut self, key: &str, section_text: &str) {
        {
            let record = self.chapters.get_mut(key).expect("append_section called before register_chapter");
            record.sections.push(section_text.to_string());
            record.sections_since_last_micro += 1;
            record.last_updated = Utc::now();
            extract_entity_hints(record, section_text);
        }

        if self.mode == ContextMode::Intelligent {
            let should_condense = {
                let record = self.chapters.get(key).unwrap();
                self.config.enable_micro_summaries
                    && record.sections_since_last_micro >= self.config.micro_summary_interval
                    && record.sections.len() >= self.config.micro_summary_interval
            };
            if should_condense {
                self.condense_recent_sections(key).await;
            }
        }
    }

    async fn condense_recent_sections(&mut self, key: &str) {
        let interval = self.config.micro_summary_interval;
        let recent: Vec<String> = {
            let record = self.chapters.get(key).unwrap();
            record.sections[record.sections.len() - interval..].to_vec()
        };
        let joined = recent.join("\n\n");
        let for_summary = self.segment_for_summarization(&joined);

        let summary = match &self.summarizer {
            Some(invoker) => {
                let vars = prompt_vars! {"sections" => for_summary.as_str()};
                match invoker.invoke("micro_summary", &Prompts::micro_summary(), &vars).await {
                    Ok(outcome) => outcome.answer,
                    Err(err) => {
                        warn!(key, error = %err, "micro-summary LLM call failed, falling back to extractive summary");
                        extractive_summary(&joined)
                    }
                }
            }
            None => extractive_summary(&joined),
        };

        let record = self.chapters.get_mut(key).unwrap();
        let kept = record.sections.len() - interval;
        record.sections.truncate(kept);
        record.sections.push(format!("[savepoint] {summary}"));
        record.sections_since_last_micro = 0;
    }

    /// §4.8 algorithm: framework, then prior rolling summaries (newest
    /// first) until budget, then the current chapter's recent content.
    pub fn get_context_for_section(&self, current_chapter_number: usize, position: SectionPosition, key: &str) -> ContextResponse {
        let _ = (current_chapter_number, position);

        if self.mode == ContextMode::Simple {
            return ContextResponse {
                framework: truncate_chars(&self.framework, self.config.limited_size),
                previous_chapters_summary: String::new(),
                current_chapter_summary: String::new(),
                key_entities: HashMap::new(),
            };
        }

        let budget = self.config.standard_size;
        let framework = truncate_chars(&self.framework, self.config.limited_size.min(budget));
        let mut remaining = budget.saturating_sub(framework.chars().count());

        let position_in_order = self.order.iter().position(|k| k == key).unwrap_or(self.order.len());
        let mut prior_summaries = Vec::new();
        for prior_key in self.order[..position_in_order].iter().rev() {
            let Some(record) = self.chapters.get(prior_key) else { continue };
            if record.rolling_summary.is_empty() {
                continue;
            }
            let candidate_len = record.rolling_summary.chars().count();
            if candidate_len > remaining {
                break;
            }
            remaining -= candidate_len;
            prior_summaries.push(record.rolling_summary.clone());
        }
        let previous_chapters_summary = prior_summaries.join("\n\n");

        let current_chapter_summary = match self.chapters.get(key) {
            Some(record) => {
                let recent = recent_paragraphs(&record.sections, RECENT_PARAGRAPHS);
                truncate_chars(&recent, remaining)
            }
            None => String::new(),
        };

        let key_entities = self.chapters.get(key).map(|r| r.entity_hints.clone()).unwrap_or_default();

        ContextResponse { framework, previous_chapters_summary, current_chapter_summary, key_entities }
    }

    /// Condenses the full section list via C5 into a rolling summary;
    /// falls back to an extractive summary if the call fails (§4.8
    /// failure semantics: never block the write loop on a failed summary).
    pub async fn finalize_chapter(&mut self, key: &str) -> String {
        let (title, joined) = {
            let record = self.chapters.get(key).expect("finalize_chapter called before register_chapter");
            (record.title.clone(), record.sections.join("\n\n"))
        };

        let for_summary = self.segment_for_summarization(&joined);
        let summary = match &self.summarizer {
            Some(invoker) if self.mode != ContextMode::Simple => {
                let vars = prompt_vars! {"title" => title.as_str(), "sections" => for_summary.as_str()};
                match invoker.invoke("chapter_summary", &Prompts::chapter_summary(), &vars).await {
                    Ok(outcome) => outcome.answer,
                    Err(err) => {
                        warn!(key, error = %err, "chapter finalization LLM call failed, falling back to extractive summary");
                        extractive_summary(&joined)
                    }
                }
            }
            _ => extractive_summary(&joined),
        };

        let record = self.chapters.get_mut(key).unwrap();
        record.rolling_summary = summary.clone();
        summary
    }

    pub fn chapter_record(&self, key: &str) -> Option<&ChapterRecord> {
        self.chapters.get(key)
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

/// Deterministic extractive fallback: first + last paragraph, used when an
/// LLM summarization call fails.
fn extractive_summary(text: &str) -> String {
    let paragraphs: Vec<&str> = text.split("\n\n").filter(|p| !p.trim().is_empty()).collect();
    match paragraphs.len() {
        0 => String::new(),
        1 => paragraphs[0].to_string(),
        _ => format!("{}\n\n{}", paragraphs.first().unwrap(), paragraphs.last().unwrap()),
    }
}

fn recent_paragraphs(sections: &[String], count: usize) -> String {
    let start = sections.len().saturating_sub(count);
    sections[start..].join("\n\n")
}

/// Naive entity-hint extraction: capitalized word runs in the last
/// section, not already tracked, recorded with a placeholder description.
/// No NLP dependency is warranted for a "hint", not an authoritative
/// character registry.
fn extract_entity_hints(record: &mut ChapterRecord, section_text: &str) {
    for word in section_text.split_whitespace() {
        let trimmed: String = word.chars().filter(|c| c.is_alphabetic()).collect();
        if trimmed.chars().count() < 3 {
            continue;
        }
        let mut chars = trimmed.chars();
        let is_capitalized = chars.next().map(|c| c.is_uppercase()).unwrap_or(false)
            && chars.clone().all(|c| c.is_lowercase());
        if is_capitalized && !record.entity_hints.contains_key(&trimmed) {
            record.entity_hints.insert(trimmed.clone(), format!("mentioned in \"{}\"", record.title));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ContextConfig {
        ContextConfig {
            limited_size: 50,
            standard_size: 120,
            max_accumulation: 1000,
            enable_micro_summaries: false,
            micro_summary_interval: 2,
        }
    }

    #[tokio::test]
    async fn simple_mode_returns_only_framework() {
        let manager = ContextManager::new("The framework.".to_string(), config(), None).with_mode(ContextMode::Simple);
        let response = manager.get_context_for_section(1, SectionPosition::Start, "Capítulo 1");
        assert_eq!(response.framework, "The framework.");
        assert!(response.previous_chapters_summary.is_empty());
        assert!(response.current_chapter_summary.is_empty());
    }

    #[tokio::test]
    async fn progressive_mode_includes_prior_rolling_summaries_newest_first() {
        let mut manager =
            ContextManager::new("FW".to_string(), config(), None).with_mode(ContextMode::Progressive);
        manager.register_chapter("Capítulo 1", "One", "");
        manager.register_chapter("Capítulo 2", "Two", "");
        manager.chapters.get_mut("Capítulo 1").unwrap().rolling_summary = "summary one".to_string();
        manager.chapters.get_mut("Capítulo 2").unwrap().rolling_summary = "summary two".to_string();
        manager.register_chapter("Capítulo 3", "Three", "");

        let response = manager.get_context_for_section(3, SectionPosition::Middle, "Capítulo 3");
        assert!(response.previous_chapters_summary.starts_with("summary two"));
    }

    #[tokio::test]
    async fn budget_is_never_exceeded_oldest_summary_dropped_first() {
        let mut cfg = config();
        cfg.standard_size = 30;
        cfg.limited_size = 10;
        let mut manager = ContextManager::new("0123456789".to_string(), cfg, None).with_mode(ContextMode::Progressive);
        manager.register_chapter("Capítulo 1", "One", "");
        manager.chapters.get_mut("Capítulo 1").unwrap().rolling_summary = "a".repeat(15);
        manager.register_chapter("Capítulo 2", "Two", "");
        manager.chapters.get_mut("Capítulo 2").unwrap().rolling_summary = "b".repeat(15);
        manager.register_chapter("Capítulo 3", "Three", "");

        let response = manager.get_context_for_section(3, SectionPosition::Start, "Capítulo 3");
        assert!(response.budget_len() <= 30);
        // Newest-first consumption keeps chapter 2's summary and drops
        // chapter 1's once the remaining budget can't fit both.
        assert!(response.previous_chapters_summary.contains('b'));
    }

    #[tokio::test]
    async fn append_section_without_micro_summaries_never_condenses() {
        let mut cfg = config();
        cfg.enable_micro_summaries = false;
        let mut manager = ContextManager::new("FW".to_string(), cfg, None).with_mode(ContextMode::Intelligent);
        manager.register_chapter("Capítulo 1", "One", "");
        for i in 0..5 {
            manager.append_section("Capítulo 1", &format!("section {i}")).await;
        }
        assert_eq!(manager.chapter_record("Capítulo 1").unwrap().sections.len(), 5);
    }

    #[tokio::test]
    async fn append_section_condenses_via_extractive_fallback_without_a_summarizer() {
        let mut cfg = config();
        cfg.enable_micro_summaries = true;
        cfg.micro_summary_interval = 2;
        let mut manager = ContextManager::new("FW".to_string(), cfg, None).with_mode(ContextMode::Intelligent);
        manager.register_chapter("Capítulo 1", "One", "");
        manager.append_section("Capítulo 1", "first section text.").await;
        manager.append_section("Capítulo 1", "second section text.").await;
        let record = manager.chapter_record("Capítulo 1").unwrap();
        assert_eq!(record.sections.len(), 1);
        assert!(record.sections[0].starts_with("[savepoint]"));
    }

    #[tokio::test]
    async fn finalize_chapter_without_summarizer_falls_back_to_extractive() {
        let mut manager = ContextManager::new("FW".to_string(), config(), None).with_mode(ContextMode::Progressive);
        manager.register_chapter("Capítulo 1", "One", "");
        manager.append_section("Capítulo 1", "Para A.").await;
        manager.append_section("Capítulo 1", "Para B.").await;
        let summary = manager.finalize_chapter("Capítulo 1").await;
        assert_eq!(summary, "Para A.\n\nPara B.");
        assert_eq!(manager.chapter_record("Capítulo 1").unwrap().rolling_summary, summary);
    }

    #[test]
    fn segment_for_summarization_shrinks_text_past_max_accumulation() {
        let mut cfg = config();
        cfg.max_accumulation = 200;
        let manager = ContextManager::new("FW".to_string(), cfg, None);
        let long_text: String = (0..500).map(|i| format!("sentence {i}. ")).collect();
        let shrunk = manager.segment_for_summarization(&long_text);
        assert!(shrunk.chars().count() < long_text.chars().count());
    }

    #[test]
    fn segment_for_summarization_passes_short_text_through_unchanged() {
        let manager = ContextManager::new("FW".to_string(), config(), None);
        let short_text = "a short chapter.";
        assert_eq!(manager.segment_for_summarization(short_text), short_text);
    }
}
