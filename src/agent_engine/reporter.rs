use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::agent_engine::state::{SessionEvent, SessionStatus, StepReport};

/// Producer side of a session's event stream.
///
/// A session emits at most `total_steps + 2` events, so the channel is unbounded
/// and sends never wait on the consumer. A consumer that goes away is logged once
/// and the session keeps running.
pub struct StepReporter {
    tx: mpsc::UnboundedSender<SessionEvent>,
    closed_logged: AtomicBool,
}

impl StepReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed_logged: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn started(&self, session_id: &str, total_steps: usize) {
        self.emit(SessionEvent::Started {
            session_id: session_id.to_string(),
            total_steps,
        });
    }

    pub fn step(&self, report: StepReport) {
        self.emit(SessionEvent::StepResult(report));
    }

    pub fn finished(&self, status: SessionStatus, message: Option<String>) {
        self.emit(SessionEvent::Finished { status, message });
    }

    fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() && !self.closed_logged.swap(true, Ordering::Relaxed) {
            tracing::warn!("report consumer dropped; continuing without reports");
        }
    }
}
