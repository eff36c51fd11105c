//! C1: pure regex pipeline removing reasoning tags, ANSI escapes, metadata
//! markers, and excess whitespace from already-accumulated text.
//!
//! Unlike the streaming sanitizer (`text::sanitizer`), the cleaner never
//! sees a live token stream — it runs once over a complete string, which is
//! why it can afford regex instead of a hand-rolled FSM.

use once_cell::sync::Lazy;
use regex::Regex;

/// A cleaning stage, applied in declared order by `clean`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    AnsiCodes,
    ThinkTags,
    Metadata,
    NarrativeMarkers,
    Whitespace,
}

static ANSI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());
static THINK_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());
static THINK_TAG_UNCLOSED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*$").unwrap());
static METADATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*\[(DEV NOTE|AUTHOR NOTE|METADATA)[^\]]*\]\s*.*$").unwrap()
});
static NARRATIVE_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\[Nota:[^\]]*\]").unwrap());
static BLANK_RUNS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Runs `stages`, in the order given, over `text`. Idempotent for any fixed
/// stage set: `clean(clean(x, s), s) == clean(x, s)`.
pub fn clean(text: &str, stages: &[Stage]) -> String {
    let mut out = text.to_string();
    for stage in stages {
        out = apply_stage(&out, *stage);
    }
    out
}

fn apply_stage(text: &str, stage: Stage) -> String {
    match stage {
        Stage::AnsiCodes => ANSI_RE.replace_all(text, "").into_owned(),
        Stage::ThinkTags => {
            let without_closed = THINK_TAG_RE.replace_all(text, "");
            THINK_TAG_UNCLOSED_RE.replace_all(&without_closed, "").into_owned()
        }
        Stage::Metadata => METADATA_RE.replace_all(text, "").into_owned(),
        Stage::NarrativeMarkers => NARRATIVE_MARKER_RE.replace_all(text, "").into_owned(),
        Stage::Whitespace => {
            let collapsed = BLANK_RUNS_RE.replace_all(text, "\n\n");
            collapsed.trim().to_string()
        }
    }
}

/// The stage set the LLM invocation wrapper (C5) applies to every
/// accumulated answer, per §4.5 step 5.
pub const INVOCATION_STAGES: [Stage; 3] = [Stage::AnsiCodes, Stage::ThinkTags, Stage::Whitespace];
