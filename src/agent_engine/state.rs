use serde::{Deserialize, Serialize};

use crate::perception::screenshot::Screenshot;

/// Closed set of scripted step kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    Input,
    Swipe,
    Wait,
    Assert,
    Scroll,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Tap => "tap",
            ActionKind::Input => "input",
            ActionKind::Swipe => "swipe",
            ActionKind::Wait => "wait",
            ActionKind::Assert => "assert",
            ActionKind::Scroll => "scroll",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

/// One scripted step with its own retry budget. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicAction {
    #[serde(rename = "type")]
    kind: ActionKind,
    /// Element description for TAP/ASSERT, free text for the others.
    target: String,
    /// Text sent by INPUT.
    #[serde(default)]
    value: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    max_retries: u32,
}

impl AtomicAction {
    pub fn new(kind: ActionKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            value: String::new(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }

    pub fn tap(target: impl Into<String>) -> Self {
        Self::new(ActionKind::Tap, target)
    }

    pub fn assert(target: impl Into<String>) -> Self {
        Self::new(ActionKind::Assert, target)
    }

    pub fn wait(description: impl Into<String>, secs: u64) -> Self {
        Self::new(ActionKind::Wait, description).with_timeout_secs(secs)
    }

    pub fn input(description: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(ActionKind::Input, description).with_value(text)
    }

    pub fn scroll(description: impl Into<String>) -> Self {
        Self::new(ActionKind::Scroll, description)
    }

    pub fn swipe(description: impl Into<String>) -> Self {
        Self::new(ActionKind::Swipe, description)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Values below 1 are clamped to 1.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Attempts allowed for this action; always at least one.
    pub fn max_retries(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Outcome of one attempt at an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    /// The observation the attempt acted on.
    pub screenshot: Option<Screenshot>,
    pub coordinate: Option<(i32, i32)>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            screenshot: None,
            coordinate: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            screenshot: None,
            coordinate: None,
        }
    }

    pub fn with_screenshot(mut self, screenshot: Screenshot) -> Self {
        self.screenshot = Some(screenshot);
        self
    }

    pub fn at(mut self, coordinate: (i32, i32)) -> Self {
        self.coordinate = Some(coordinate);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Passed | SessionStatus::Failed)
    }
}

/// How a target was turned into a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    UiTree,
    Disambiguate,
    Vision,
}

/// Final outcome of one action, as streamed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step_id: usize,
    pub action: ActionKind,
    pub target: String,
    pub success: bool,
    pub attempts: u32,
    /// Base64 screenshot taken after the settle delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<[i32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
}

/// Session lifecycle messages, in emission order: one `Started`, one
/// `StepResult` per attempted action, one `Finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Started {
        session_id: String,
        total_steps: usize,
    },
    StepResult(StepReport),
    #[serde(rename_all = "camelCase")]
    Finished {
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}
