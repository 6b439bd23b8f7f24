use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::agent_engine::state::{ActionKind, ActionResult};
use crate::errors::SinanResult;

/// One attempt at one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts: i64,
    pub step: usize,
    pub attempt: u32,
    pub action: ActionKind,
    pub target: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<(i32, i32)>,
}

impl HistoryEntry {
    pub fn from_result(
        step: usize,
        attempt: u32,
        action: ActionKind,
        target: &str,
        result: &ActionResult,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            step,
            attempt,
            action,
            target: target.to_string(),
            success: result.success,
            message: result.message.clone(),
            coordinate: result.coordinate,
        }
    }
}

/// Append-only attempt log, optionally mirrored to a JSONL journal.
pub struct SessionHistory {
    entries: Vec<HistoryEntry>,
    journal: Option<PathBuf>,
}

impl SessionHistory {
    pub fn in_memory() -> Self {
        Self {
            entries: Vec::new(),
            journal: None,
        }
    }

    /// Journal lands at `<dir>/session_<session_id>.jsonl`.
    pub fn journaled(dir: &Path, session_id: &str) -> Self {
        Self {
            entries: Vec::new(),
            journal: Some(dir.join(format!("session_{session_id}.jsonl"))),
        }
    }

    pub fn journal_path(&self) -> Option<&Path> {
        self.journal.as_deref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "journal write failed");
        }
    }

    /// Append the latest entry to the JSONL file.
    fn flush(&self) -> SinanResult<()> {
        let (Some(path), Some(last)) = (&self.journal, self.entries.last()) else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let line = serde_json::to_string(last)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", line)?;
        tracing::debug!(path = %path.display(), "history entry flushed");
        Ok(())
    }
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_gets_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = SessionHistory::journaled(&dir.path().join("sessions"), "abc");
        history.push(HistoryEntry::from_result(
            1,
            1,
            ActionKind::Tap,
            "外卖",
            &ActionResult::failed("element not found: 外卖"),
        ));
        history.push(HistoryEntry::from_result(
            1,
            2,
            ActionKind::Tap,
            "外卖",
            &ActionResult::ok("tapped").at((200, 230)),
        ));

        let path = dir.path().join("sessions").join("session_abc.jsonl");
        assert_eq!(history.journal_path(), Some(path.as_path()));
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<HistoryEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(!lines[0].success);
        assert_eq!(lines[1].attempt, 2);
        assert_eq!(lines[1].coordinate, Some((200, 230)));
    }

    #[test]
    fn in_memory_history_writes_nothing() {
        let mut history = SessionHistory::in_memory();
        history.push(HistoryEntry::from_result(
            1,
            1,
            ActionKind::Wait,
            "wait",
            &ActionResult::ok("waited 0s"),
        ));
        assert_eq!(history.entries().len(), 1);
        assert!(history.journal_path().is_none());
    }
}
