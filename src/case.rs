//! Saved test cases: a named, ordered list of steps stored as JSON.
//!
//! Keys are camelCase; the snake_case spelling written by older case stores is
//! accepted as well.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent_engine::state::{ActionKind, AtomicAction, SessionStatus};
use crate::errors::{SinanError, SinanResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStep {
    #[serde(alias = "step_id")]
    pub step_id: usize,
    pub action: ActionKind,
    #[serde(alias = "target_desc")]
    pub target_desc: String,
    #[serde(default)]
    pub value: String,
    #[serde(default, alias = "timeout_secs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, alias = "max_retries", skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl CaseStep {
    /// Builds the action, filling unset retry budgets with `default_max_retries`.
    pub fn to_action(&self, default_max_retries: u32) -> AtomicAction {
        let mut action = AtomicAction::new(self.action, self.target_desc.clone())
            .with_value(self.value.clone())
            .with_max_retries(self.max_retries.unwrap_or(default_max_retries));
        if let Some(secs) = self.timeout_secs {
            action = action.with_timeout_secs(secs);
        }
        action
    }
}

fn default_created_at() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn default_status() -> SessionStatus {
    SessionStatus::Pending
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(alias = "case_id")]
    pub case_id: String,
    #[serde(alias = "case_name")]
    pub case_name: String,
    #[serde(default)]
    pub steps: Vec<CaseStep>,
    #[serde(default = "default_created_at", alias = "created_at")]
    pub created_at: String,
    #[serde(default = "default_status")]
    pub status: SessionStatus,
}

impl TestCase {
    /// Steps ordered by `stepId`, converted to executable actions.
    pub fn to_actions(&self, default_max_retries: u32) -> Vec<AtomicAction> {
        let mut steps: Vec<&CaseStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.step_id);
        steps
            .into_iter()
            .map(|s| s.to_action(default_max_retries))
            .collect()
    }
}

pub fn parse_case(content: &str) -> SinanResult<TestCase> {
    let case: TestCase = serde_json::from_str(content)
        .map_err(|e| SinanError::Case(format!("invalid case file: {e}")))?;
    if case.steps.is_empty() {
        tracing::warn!(case = %case.case_id, "case has no steps");
    }
    Ok(case)
}

pub fn load_case(path: &Path) -> SinanResult<TestCase> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SinanError::Case(format!("cannot read {}: {e}", path.display())))?;
    let case = parse_case(&content)?;
    tracing::info!(
        case = %case.case_id,
        name = %case.case_name,
        steps = case.steps.len(),
        "case loaded"
    );
    Ok(case)
}
