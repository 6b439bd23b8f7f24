use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::state::{ActionResult, AtomicAction, SessionStatus};

/// Cancels a session from outside the engine. Checked between actions only.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cancelled: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// An ordered script of actions plus everything recorded while running it.
pub struct ExecutionSession {
    id: String,
    actions: Vec<AtomicAction>,
    cursor: usize,
    /// Final result of each attempted action.
    results: Vec<ActionResult>,
    /// Every attempt, including the failed ones that were retried.
    history: SessionHistory,
    status: SessionStatus,
    stop_on_error: bool,
    handle: SessionHandle,
}

impl ExecutionSession {
    pub fn new(actions: Vec<AtomicAction>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            actions,
            cursor: 0,
            results: Vec::new(),
            history: SessionHistory::in_memory(),
            status: SessionStatus::Pending,
            stop_on_error: true,
            handle: SessionHandle {
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    /// Mirror every attempt to `<dir>/session_<id>.jsonl`.
    pub fn with_journal(mut self, dir: &Path) -> Self {
        self.history = SessionHistory::journaled(dir, &self.id);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn actions(&self) -> &[AtomicAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Index of the action currently (or last) being executed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn results(&self) -> &[ActionResult] {
        &self.results
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn stop_on_error(&self) -> bool {
        self.stop_on_error
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    pub(crate) fn begin(&mut self) {
        self.status = SessionStatus::Running;
        self.cursor = 0;
    }

    pub(crate) fn seek(&mut self, index: usize) {
        self.cursor = index;
    }

    pub(crate) fn record_attempt(&mut self, attempt: u32, result: &ActionResult) {
        let Some(action) = self.actions.get(self.cursor) else {
            return;
        };
        let entry = HistoryEntry::from_result(
            self.cursor + 1,
            attempt,
            action.kind(),
            action.target(),
            result,
        );
        self.history.push(entry);
    }

    pub(crate) fn record_result(&mut self, result: ActionResult) {
        self.results.push(result);
    }

    pub(crate) fn finish(&mut self, status: SessionStatus) {
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_pending() {
        let session = ExecutionSession::new(vec![AtomicAction::tap("a"), AtomicAction::tap("b")]);
        assert_eq!(session.status(), SessionStatus::Pending);
        assert_eq!(session.len(), 2);
        assert!(session.results().is_empty());
        assert!(session.stop_on_error());
    }

    #[test]
    fn handles_share_the_cancel_flag() {
        let session = ExecutionSession::new(vec![]);
        let handle = session.handle();
        assert!(!session.is_cancelled());
        handle.clone().cancel();
        assert!(session.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn attempts_are_tagged_with_the_cursor_step() {
        let mut session = ExecutionSession::new(vec![AtomicAction::wait("w", 0), AtomicAction::tap("x")]);
        session.begin();
        session.seek(1);
        session.record_attempt(2, &ActionResult::failed("element not found: x"));
        let entry = &session.history().entries()[0];
        assert_eq!(entry.step, 2);
        assert_eq!(entry.attempt, 2);
        assert_eq!(entry.target, "x");
    }
}
