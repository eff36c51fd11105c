//! Token accounting, reconstructed from the `TokenTracker` the teacher's
//! `book/chapter.rs` and `book/genre.rs` thread through every LLM call site
//! (referenced, not included, in the retrieved sample). Backed by
//! `std::sync::Mutex` rather than an atomic pair since prompt and
//! completion counts must update together.

use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Totals {
    prompt_tokens: u64,
    completion_tokens: u64,
    calls: u64,
}

/// Accumulates prompt/completion token counts across every LLM call in a
/// run. One instance is shared (by reference) across the whole pipeline.
#[derive(Debug, Default)]
pub struct TokenTracker {
    totals: Mutex<Totals>,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one call's usage, logging the running totals at `debug!`.
    pub fn record(&self, site: &str, prompt_tokens: u32, completion_tokens: u32) {
        let mut totals = self.totals.lock().unwrap();
        totals.prompt_tokens += prompt_tokens as u64;
        totals.completion_tokens += completion_tokens as u64;
        totals.calls += 1;
        debug!(
            site,
            prompt_tokens,
            completion_tokens,
            running_prompt_total = totals.prompt_tokens,
            running_completion_total = totals.completion_tokens,
            "llm call token usage"
        );
    }

    pub fn totals(&self) -> (u64, u64, u64) {
        let totals = self.totals.lock().unwrap();
        (totals.prompt_tokens, totals.completion_tokens, totals.calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_calls() {
        let tracker = TokenTracker::new();
        tracker.record("title", 100, 20);
        tracker.record("framework", 150, 400);
        let (prompt, completion, calls) = tracker.totals();
        assert_eq!(prompt, 250);
        assert_eq!(completion, 420);
        assert_eq!(calls, 2);
    }
}
