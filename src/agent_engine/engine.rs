use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::agent_engine::reporter::StepReporter;
use crate::agent_engine::resolver::{resolve, Resolution};
use crate::agent_engine::session::ExecutionSession;
use crate::agent_engine::state::{
    ActionKind, ActionResult, AtomicAction, SessionStatus, StepReport, Strategy,
};
use crate::config::ExecutionConfig;
use crate::device::traits::Device;
use crate::errors::{SinanError, SinanResult};
use crate::perception::screenshot::Screenshot;
use crate::perception::traits::VisionDetector;
use crate::perception::types::{Detection, Element};
use crate::perception::ui_tree::normalize;

/// Result of a one-off natural-language instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstructionOutcome {
    Tapped {
        coordinate: (i32, i32),
        strategy: Strategy,
    },
    /// Several elements matched; nothing was tapped.
    NeedsDisambiguation { candidates: Vec<Element> },
    NotFound,
}

impl InstructionOutcome {
    pub fn strategy(&self) -> Strategy {
        match self {
            InstructionOutcome::Tapped { strategy, .. } => *strategy,
            InstructionOutcome::NeedsDisambiguation { .. } => Strategy::Disambiguate,
            InstructionOutcome::NotFound => Strategy::Vision,
        }
    }
}

/// Where a target phrase resolved to, and how.
#[derive(Debug, Clone)]
struct Located {
    coordinate: (i32, i32),
    strategy: Strategy,
    phrase: String,
}

struct ActionOutcome {
    result: ActionResult,
    attempts: u32,
    strategy: Option<Strategy>,
}

/// Drives one device through scripted sessions and single instructions.
pub struct ExecutionEngine {
    device: Arc<dyn Device>,
    vision: Arc<dyn VisionDetector>,
    config: ExecutionConfig,
    /// Target → alternate phrasings tried after the target itself.
    alternates: HashMap<String, Vec<String>>,
}

impl ExecutionEngine {
    pub fn new(
        device: Arc<dyn Device>,
        vision: Arc<dyn VisionDetector>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            device,
            vision,
            config,
            alternates: HashMap::new(),
        }
    }

    pub fn with_alternates(mut self, alternates: HashMap<String, Vec<String>>) -> Self {
        self.alternates = alternates;
        self
    }

    // ── Single instruction ─────────────────────────────────────────────────

    /// Resolves `instruction` against the live screen and taps it when the
    /// target is unambiguous. Ambiguity is handed back to the caller.
    pub async fn execute_instruction(&self, instruction: &str) -> SinanResult<InstructionOutcome> {
        let elements = self.fetch_elements().await;
        match resolve(instruction, &elements) {
            Resolution::UiTree(element) => {
                tracing::info!(instruction, label = element.label(), "ui tree hit");
                self.tap_checked(element.center).await?;
                Ok(InstructionOutcome::Tapped {
                    coordinate: element.center,
                    strategy: Strategy::UiTree,
                })
            }
            Resolution::Disambiguate(candidates) => {
                tracing::info!(instruction, candidates = candidates.len(), "ambiguous instruction");
                Ok(InstructionOutcome::NeedsDisambiguation { candidates })
            }
            Resolution::Vision => {
                let image = self.device.screenshot().await?;
                match self.vision_lookup(&image, instruction).await {
                    Some(detection) => {
                        tracing::info!(instruction, center = ?detection.center, "vision hit");
                        self.tap_checked(detection.center).await?;
                        Ok(InstructionOutcome::Tapped {
                            coordinate: detection.center,
                            strategy: Strategy::Vision,
                        })
                    }
                    None => Ok(InstructionOutcome::NotFound),
                }
            }
        }
    }

    async fn tap_checked(&self, (x, y): (i32, i32)) -> SinanResult<()> {
        if self.device.tap(x, y).await? {
            Ok(())
        } else {
            Err(SinanError::Device(format!("tap rejected at ({x}, {y})")))
        }
    }

    // ── Sessions ───────────────────────────────────────────────────────────

    /// Runs every action of `session` in order and returns its terminal status.
    pub async fn run(&self, session: &mut ExecutionSession, reporter: &StepReporter) -> SessionStatus {
        if session.status().is_terminal() {
            tracing::warn!(session = %session.id(), status = ?session.status(), "session already finished");
            return session.status();
        }
        session.begin();
        reporter.started(session.id(), session.len());
        tracing::info!(
            session = %session.id(),
            device = %self.device.serial(),
            steps = session.len(),
            "session started"
        );

        let mut failure: Option<String> = None;
        for index in 0..session.len() {
            if session.is_cancelled() {
                tracing::info!(session = %session.id(), step = index + 1, "session cancelled");
                failure = Some(SinanError::Cancelled.to_string());
                break;
            }
            session.seek(index);
            let action = session.actions()[index].clone();
            let step = session.cursor() + 1;
            tracing::info!(step, kind = %action.kind(), desc = action.target(), "executing action");

            let outcome = self.execute_action(session, step, &action).await;
            let after = self.settle_and_capture().await;

            let success = outcome.result.success;
            let message = outcome.result.message.clone();
            reporter.step(StepReport {
                step_id: step,
                action: action.kind(),
                target: action.target().to_string(),
                success,
                attempts: outcome.attempts,
                screenshot: after.map(|shot| shot.to_base64()),
                error: (!success).then(|| message.clone()),
                coordinate: outcome.result.coordinate.map(|(x, y)| [x, y]),
                strategy: outcome.strategy,
            });
            session.record_result(outcome.result);

            if success {
                tracing::info!(step, attempts = outcome.attempts, "action succeeded");
            } else {
                tracing::warn!(step, attempts = outcome.attempts, error = %message, "action failed");
                failure = Some(message);
                if session.stop_on_error() {
                    break;
                }
            }
        }

        let status = if failure.is_some() {
            SessionStatus::Failed
        } else {
            SessionStatus::Passed
        };
        session.finish(status);
        tracing::info!(session = %session.id(), status = ?status, "session finished");
        reporter.finished(status, failure);
        status
    }

    async fn execute_action(
        &self,
        session: &mut ExecutionSession,
        step: usize,
        action: &AtomicAction,
    ) -> ActionOutcome {
        let max = action.max_retries();
        let mut last = None;
        for attempt in 1..=max {
            if attempt > 1 {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
            let (result, strategy) = match self.attempt(step, action, attempt == max).await {
                Ok(outcome) => outcome,
                Err(e) => (ActionResult::failed(format!("execution error: {e}")), None),
            };
            session.record_attempt(attempt, &result);
            if result.success {
                return ActionOutcome {
                    result,
                    attempts: attempt,
                    strategy,
                };
            }
            tracing::debug!(step, attempt, max, error = %result.message, "attempt failed");
            last = Some((result, strategy));
        }
        let (result, strategy) =
            last.unwrap_or_else(|| (ActionResult::failed("retries exhausted"), None));
        ActionOutcome {
            result,
            attempts: max,
            strategy,
        }
    }

    /// One attempt. `Err` is a transport failure; `Ok` with `success == false`
    /// is a resolved-but-unsuccessful attempt. Both consume a retry.
    async fn attempt(
        &self,
        step: usize,
        action: &AtomicAction,
        final_attempt: bool,
    ) -> SinanResult<(ActionResult, Option<Strategy>)> {
        let shot = Screenshot::new(self.device.screenshot().await?);
        let target = action.target();

        let (result, strategy) = match action.kind() {
            ActionKind::Wait => {
                tokio::time::sleep(Duration::from_secs(action.timeout_secs())).await;
                (ActionResult::ok(format!("waited {}s", action.timeout_secs())), None)
            }
            ActionKind::Tap => match self.locate(target, &shot).await {
                Some(found) => {
                    let (x, y) = found.coordinate;
                    let result = if self.device.tap(x, y).await? {
                        ActionResult::ok(format!("tapped {} at ({x}, {y})", found.phrase))
                    } else {
                        ActionResult::failed(format!("tap rejected at ({x}, {y})"))
                    };
                    (result.at(found.coordinate), Some(found.strategy))
                }
                None => {
                    if final_attempt {
                        self.save_diagnostic(&shot, step, target);
                    }
                    (ActionResult::failed(format!("element not found: {target}")), None)
                }
            },
            ActionKind::Input => {
                let result = if self.device.input_text(action.value()).await? {
                    ActionResult::ok(format!("entered {} chars", action.value().chars().count()))
                } else {
                    ActionResult::failed("text input rejected")
                };
                (result, None)
            }
            ActionKind::Swipe | ActionKind::Scroll => {
                let g = &self.config.scroll;
                let result = if self.device.swipe(g.x1, g.y1, g.x2, g.y2, g.duration_ms).await? {
                    ActionResult::ok(format!(
                        "{} ({}, {}) -> ({}, {})",
                        action.kind(),
                        g.x1,
                        g.y1,
                        g.x2,
                        g.y2
                    ))
                } else {
                    ActionResult::failed(format!("{} gesture rejected", action.kind()))
                };
                (result, None)
            }
            ActionKind::Assert => match self.verify(target, &shot).await {
                Some((found, 1)) => (
                    ActionResult::ok(format!("verified: {target}")).at(found.coordinate),
                    Some(found.strategy),
                ),
                Some((found, matches)) => (
                    ActionResult::ok(format!("verified: {target} ({matches} matches)"))
                        .at(found.coordinate),
                    Some(found.strategy),
                ),
                None => {
                    tracing::warn!(step, desc = target, "assertion target not found");
                    (ActionResult::ok(format!("verification skipped: {target} not found")), None)
                }
            },
        };
        Ok((result.with_screenshot(shot), strategy))
    }

    // ── Resolution ─────────────────────────────────────────────────────────

    async fn fetch_elements(&self) -> Vec<Element> {
        match self.device.ui_tree().await {
            Ok(tree) => normalize(&tree),
            Err(e) => {
                tracing::warn!(error = %e, "ui tree unavailable; only vision can resolve");
                Vec::new()
            }
        }
    }

    /// Tries `target`, then its alternate phrasings, against one fresh tree.
    async fn locate(&self, target: &str, shot: &Screenshot) -> Option<Located> {
        let elements = self.fetch_elements().await;
        let alternates = self.alternates.get(target).map(Vec::as_slice).unwrap_or_default();

        for phrase in std::iter::once(target).chain(alternates.iter().map(String::as_str)) {
            if let Some(found) = self.locate_phrase(phrase, &elements, shot).await {
                if phrase != target {
                    tracing::info!(desc = target, phrase, "resolved through alternate phrasing");
                }
                return Some(found);
            }
        }
        None
    }

    /// ASSERT lookup on the primary description only. Several structural matches
    /// still prove the target is on screen; the first one is reported along with
    /// the match count.
    async fn verify(&self, target: &str, shot: &Screenshot) -> Option<(Located, usize)> {
        let elements = self.fetch_elements().await;
        let located = |coordinate, strategy| Located {
            coordinate,
            strategy,
            phrase: target.to_string(),
        };
        match resolve(target, &elements) {
            Resolution::UiTree(element) => Some((located(element.center, Strategy::UiTree), 1)),
            Resolution::Disambiguate(candidates) => {
                let first = candidates.first()?;
                Some((located(first.center, Strategy::Disambiguate), candidates.len()))
            }
            Resolution::Vision => self.vision_locate(target, shot).await.map(|found| (found, 1)),
        }
    }

    async fn locate_phrase(
        &self,
        phrase: &str,
        elements: &[Element],
        shot: &Screenshot,
    ) -> Option<Located> {
        match resolve(phrase, elements) {
            Resolution::UiTree(element) => Some(Located {
                coordinate: element.center,
                strategy: Strategy::UiTree,
                phrase: phrase.to_string(),
            }),
            Resolution::Disambiguate(candidates) => {
                tracing::debug!(phrase, candidates = candidates.len(), "ambiguous; asking vision");
                self.vision_locate(phrase, shot).await
            }
            Resolution::Vision => self.vision_locate(phrase, shot).await,
        }
    }

    async fn vision_locate(&self, phrase: &str, shot: &Screenshot) -> Option<Located> {
        let detection = self.vision_lookup(&shot.image_bytes, phrase).await?;
        Some(Located {
            coordinate: detection.center,
            strategy: Strategy::Vision,
            phrase: phrase.to_string(),
        })
    }

    /// Not ready, errors and empty answers all mean "no detection".
    async fn vision_lookup(&self, image: &[u8], phrase: &str) -> Option<Detection> {
        if !self.vision.is_ready() {
            tracing::debug!(detector = self.vision.name(), "vision not ready");
            return None;
        }
        match self.vision.detect(image, phrase).await {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(detector = self.vision.name(), error = %e, "vision detection failed");
                None
            }
        }
    }

    // ── Observation ────────────────────────────────────────────────────────

    async fn settle_and_capture(&self) -> Option<Screenshot> {
        tokio::time::sleep(self.config.settle_delay()).await;
        match self.device.screenshot().await {
            Ok(bytes) => Some(Screenshot::new(bytes)),
            Err(e) => {
                tracing::warn!(error = %e, "post-action screenshot failed");
                None
            }
        }
    }

    fn save_diagnostic(&self, shot: &Screenshot, step: usize, target: &str) {
        let dir = self.config.diagnostics_dir();
        if let Err(e) = shot.save_diagnostic(&dir, step, target) {
            tracing::warn!(error = %e, dir = %dir.display(), "diagnostic screenshot not saved");
        }
    }
}
