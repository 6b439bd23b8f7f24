use async_trait::async_trait;

use crate::errors::SinanResult;
use crate::perception::types::Detection;

/// Vision fallback: locates the element described by `instruction` on a screenshot.
///
/// Callers treat `Err`, `Ok(None)` and `is_ready() == false` alike, as "nothing found".
#[async_trait]
pub trait VisionDetector: Send + Sync {
    fn name(&self) -> &str;

    fn is_ready(&self) -> bool;

    async fn detect(&self, image: &[u8], instruction: &str) -> SinanResult<Option<Detection>>;
}

/// Detector used when no vision backend is configured.
pub struct DisabledVision;

#[async_trait]
impl VisionDetector for DisabledVision {
    fn name(&self) -> &str {
        "disabled"
    }

    fn is_ready(&self) -> bool {
        false
    }

    async fn detect(&self, _image: &[u8], _instruction: &str) -> SinanResult<Option<Detection>> {
        Ok(None)
    }
}

#[cfg(test)]
pub mod scripted {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::errors::SinanError;

    /// Answers from a fixed instruction → bbox table and records every query.
    pub struct ScriptedVision {
        answers: HashMap<String, [i32; 4]>,
        ready: bool,
        failing: bool,
        pub queries: Mutex<Vec<String>>,
    }

    impl ScriptedVision {
        pub fn new(answers: &[(&str, [i32; 4])]) -> Self {
            Self {
                answers: answers.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                ready: true,
                failing: false,
                queries: Mutex::new(Vec::new()),
            }
        }

        pub fn not_ready(mut self) -> Self {
            self.ready = false;
            self
        }

        pub fn failing(mut self) -> Self {
            self.failing = true;
            self
        }

        pub fn query_log(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl VisionDetector for ScriptedVision {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn detect(&self, _image: &[u8], instruction: &str) -> SinanResult<Option<Detection>> {
            self.queries.lock().unwrap().push(instruction.to_string());
            if self.failing {
                return Err(SinanError::Vision("connection refused".into()));
            }
            Ok(self.answers.get(instruction).copied().map(Detection::from_bbox))
        }
    }
}
