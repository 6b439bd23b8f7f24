use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::SinanResult;
use crate::perception::ui_tree::RawUiTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Harmony,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Android => f.write_str("android"),
            Platform::Harmony => f.write_str("harmony"),
        }
    }
}

/// A device found by discovery, before any connection is made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: String,
    #[serde(rename = "type")]
    pub platform: Platform,
}

/// Capability contract every device transport satisfies.
///
/// Physical commands return `Ok(false)` when the device rejected the command and
/// `Err` when the transport itself failed; the execution loop treats both as a
/// failed attempt.
#[async_trait]
pub trait Device: Send + Sync {
    fn serial(&self) -> &str;

    fn platform(&self) -> Platform;

    async fn connect(&self) -> SinanResult<bool>;

    async fn disconnect(&self);

    async fn tap(&self, x: i32, y: i32) -> SinanResult<bool>;

    async fn swipe(&self, x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u32)
        -> SinanResult<bool>;

    /// Encoded image bytes (PNG or JPEG).
    async fn screenshot(&self) -> SinanResult<Vec<u8>>;

    async fn ui_tree(&self) -> SinanResult<RawUiTree>;

    async fn input_text(&self, text: &str) -> SinanResult<bool>;
}
