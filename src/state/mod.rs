//! C11: immutable workflow status with observer fan-out.
//!
//! New in this rewrite — the teacher has no equivalent. Progress in
//! `server.rs`'s `run_generation` is a `JobStatus.progress: f32` field
//! mutated in place at each call site, exactly the "shared dictionary
//! mutated by many call sites" the design notes name as the bug class this
//! immutable record exists to remove (§9, "Why immutable state").

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationStatus {
    Idle,
    Starting,
    ConfiguringModel,
    GeneratingStructure,
    StructureComplete,
    GeneratingIdeas,
    IdeasComplete,
    WritingBook,
    ChapterComplete,
    WritingComplete,
    SavingDocument,
    Complete,
    Error,
}

impl GenerationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, GenerationStatus::Complete | GenerationStatus::Error)
    }
}

/// The declared transition table (§4.11): a mostly-linear DAG, `Error`
/// reachable from every non-terminal state, `Complete` reachable only from
/// `SavingDocument`, `ChapterComplete` re-entering `WritingBook` for the
/// next chapter.
fn legal_transition(from: GenerationStatus, to: GenerationStatus) -> bool {
    use GenerationStatus::*;
    if from.is_terminal() {
        return false;
    }
    if to == Error {
        return true;
    }
    matches!(
        (from, to),
        (Idle, Starting)
            | (Starting, ConfiguringModel)
            | (ConfiguringModel, GeneratingStructure)
            | (GeneratingStructure, StructureComplete)
            | (StructureComplete, GeneratingIdeas)
            | (GeneratingIdeas, IdeasComplete)
            | (IdeasComplete, WritingBook)
            | (WritingBook, ChapterComplete)
            | (ChapterComplete, WritingBook)
            | (ChapterComplete, WritingComplete)
            | (WritingComplete, SavingDocument)
            | (SavingDocument, Complete)
    )
}

/// Every mutation produces a new value (§3 invariant).
#[derive(Debug, Clone, Serialize)]
pub struct GenerationState {
    pub status: GenerationStatus,
    pub title: Option<String>,
    pub current_step: String,
    pub progress: u8,
    pub chapter_count: usize,
    pub current_chapter: Option<String>,
    pub error: Option<String>,
    pub book_ready: bool,
    pub file_path: Option<String>,
    pub output_format: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl GenerationState {
    fn idle() -> Self {
        Self {
            status: GenerationStatus::Idle,
            title: None,
            current_step: "idle".to_string(),
            progress: 0,
            chapter_count: 0,
            current_chapter: None,
            error: None,
            book_ready: false,
            file_path: None,
            output_format: None,
            timestamp: Utc::now(),
        }
    }
}

/// Subscriber to state-transition events. Called synchronously on the
/// pipeline thread, outside the state manager's mutex (§5).
pub trait Observer: Send + Sync {
    fn notify(&self, state: &GenerationState);
}

/// Logs every transition at `info!` (or `error!` for `ERROR`), the plain
/// always-present observer alongside whatever UI-facing one is attached.
pub struct LoggingObserver;

impl Observer for LoggingObserver {
    fn notify(&self, state: &GenerationState) {
        if state.status == GenerationStatus::Error {
            error!(status = ?state.status, error = ?state.error, "generation entered error state");
        } else {
            info!(status = ?state.status, progress = state.progress, step = %state.current_step, "generation state transition");
        }
    }
}

/// Forwards every state to a broadcast channel so any number of `/ws`
/// connections can subscribe without the pipeline knowing how many
/// listeners exist.
pub struct BroadcastObserver {
    sender: tokio::sync::broadcast::Sender<GenerationState>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<GenerationState>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender: sender.clone() }, receiver)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<GenerationState> {
        self.sender.subscribe()
    }
}

impl Observer for BroadcastObserver {
    fn notify(&self, state: &GenerationState) {
        // No receivers is not an error: a `/ws` client may simply not be
        // connected yet.
        let _ = self.sender.send(state.clone());
    }
}

/// The state manager is the only shared mutable resource in the pipeline
/// (§5); a `std::sync::Mutex` covers the held state, observers are
/// notified after releasing the lock.
pub struct GenerationStateManager {
    state: Mutex<GenerationState>,
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl Default for GenerationStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationStateManager {
    pub fn new() -> Self {
        Self { state: Mutex::new(GenerationState::idle()), observers: Mutex::new(Vec::new()) }
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.lock().unwrap().push(observer);
    }

    pub fn current(&self) -> GenerationState {
        self.state.lock().unwrap().clone()
    }

    /// Validates the transition, swaps the held state atomically, then
    /// notifies observers outside the mutex. `mutate` sets whatever other
    /// fields accompany this transition (progress, current_chapter, ...).
    pub fn transition(
        &self,
        status: GenerationStatus,
        mutate: impl FnOnce(&mut GenerationState),
    ) -> Result<GenerationState, crate::error::BookGeneratorError> {
        let new_state = {
            let mut guard = self.state.lock().unwrap();
            if !legal_transition(guard.status, status) {
                return Err(crate::error::BookGeneratorError::IllegalTransition {
                    from: format!("{:?}", guard.status),
                    to: format!("{:?}", status),
                });
            }
            let mut next = guard.clone();
            next.status = status;
            next.timestamp = Utc::now();
            mutate(&mut next);
            *guard = next.clone();
            next
        };

        for observer in self.observers.lock().unwrap().iter() {
            observer.notify(&new_state);
        }
        Ok(new_state)
    }

    /// Always legal from any non-terminal state (§4.11). No-op if already
    /// terminal, since `ERROR`/`COMPLETE` cannot be re-entered.
    pub fn fail(&self, message: impl Into<String>) -> GenerationState {
        let message = message.into();
        match self.transition(GenerationStatus::Error, |s| s.error = Some(message.clone())) {
            Ok(state) => state,
            Err(_) => self.current(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingObserver(Arc<AtomicUsize>);
    impl Observer for CountingObserver {
        fn notify(&self, _state: &GenerationState) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn illegal_transition_from_idle_is_rejected_and_state_unchanged() {
        let manager = GenerationStateManager::new();
        let result = manager.transition(GenerationStatus::WritingBook, |_| {});
        assert!(matches!(result, Err(crate::error::BookGeneratorError::IllegalTransition { .. })));
        assert_eq!(manager.current().status, GenerationStatus::Idle);
    }

    #[test]
    fn legal_chain_notifies_observers_in_order() {
        let manager = GenerationStateManager::new();
        let count = Arc::new(AtomicUsize::new(0));
        manager.subscribe(Arc::new(CountingObserver(count.clone())));

        manager.transition(GenerationStatus::Starting, |_| {}).unwrap();
        manager.transition(GenerationStatus::ConfiguringModel, |_| {}).unwrap();
        manager.transition(GenerationStatus::GeneratingStructure, |_| {}).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(manager.current().status, GenerationStatus::GeneratingStructure);
    }

    #[test]
    fn error_is_reachable_from_any_non_terminal_state() {
        let manager = GenerationStateManager::new();
        manager.transition(GenerationStatus::Starting, |_| {}).unwrap();
        let state = manager.fail("provider exhausted");
        assert_eq!(state.status, GenerationStatus::Error);
        assert_eq!(state.error.as_deref(), Some("provider exhausted"));
    }

    #[test]
    fn chapter_complete_can_loop_back_to_writing_book_or_advance() {
        assert!(legal_transition(GenerationStatus::ChapterComplete, GenerationStatus::WritingBook));
        assert!(legal_transition(GenerationStatus::ChapterComplete, GenerationStatus::WritingComplete));
    }

    #[test]
    fn complete_is_only_reachable_from_saving_document() {
        assert!(legal_transition(GenerationStatus::SavingDocument, GenerationStatus::Complete));
        assert!(!legal_transition(GenerationStatus::WritingComplete, GenerationStatus::Complete));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(!legal_transition(GenerationStatus::Complete, GenerationStatus::Idle));
        assert!(!legal_transition(GenerationStatus::Error, GenerationStatus::Idle));
    }
}
