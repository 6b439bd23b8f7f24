//! HarmonyOS NEXT driver over `hdc` and the on-device `uitest` tool.
use async_trait::async_trait;

use crate::device::shell;
use crate::device::traits::{Device, Platform};
use crate::errors::{SinanError, SinanResult};
use crate::perception::ui_tree::RawUiTree;

/// `snapshot_display` refuses any extension other than `.jpeg`.
const REMOTE_SCREENSHOT: &str = "/data/local/tmp/screen.jpeg";
const REMOTE_LAYOUT: &str = "/data/local/tmp/layout.json";

pub struct HarmonyDevice {
    serial: String,
}

impl HarmonyDevice {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }

    async fn hdc(&self, args: &[&str]) -> SinanResult<shell::CommandOutput> {
        let mut full = vec!["-t", self.serial.as_str()];
        full.extend_from_slice(args);
        shell::run("hdc", &full).await
    }

    async fn hdc_checked(&self, args: &[&str]) -> SinanResult<shell::CommandOutput> {
        let mut full = vec!["-t", self.serial.as_str()];
        full.extend_from_slice(args);
        shell::run_checked("hdc", &full).await
    }
}

#[async_trait]
impl Device for HarmonyDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn platform(&self) -> Platform {
        Platform::Harmony
    }

    async fn connect(&self) -> SinanResult<bool> {
        let out = self.hdc(&["shell", "echo", "ok"]).await?;
        let ok = out.success && out.stdout_lossy().contains("ok");
        tracing::info!(serial = %self.serial, connected = ok, "hdc connect");
        Ok(ok)
    }

    async fn disconnect(&self) {
        tracing::debug!(serial = %self.serial, "hdc released");
    }

    async fn tap(&self, x: i32, y: i32) -> SinanResult<bool> {
        let (x, y) = (x.to_string(), y.to_string());
        let out = self.hdc(&["shell", "uitest", "uiInput", "click", &x, &y]).await?;
        Ok(out.success)
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> SinanResult<bool> {
        let args = [x1, y1, x2, y2].map(|v| v.to_string());
        let duration = duration_ms.to_string();
        let out = self
            .hdc(&[
                "shell", "uitest", "uiInput", "swipe", &args[0], &args[1], &args[2], &args[3],
                &duration,
            ])
            .await?;
        Ok(out.success)
    }

    async fn screenshot(&self) -> SinanResult<Vec<u8>> {
        self.hdc_checked(&["shell", "snapshot_display", "-f", REMOTE_SCREENSHOT])
            .await?;

        let local = std::env::temp_dir().join(format!("sinan_{}.jpeg", uuid::Uuid::new_v4()));
        let local_str = local.to_string_lossy().into_owned();
        self.hdc_checked(&["file", "recv", REMOTE_SCREENSHOT, &local_str])
            .await?;

        let bytes = tokio::fs::read(&local).await;
        let _ = tokio::fs::remove_file(&local).await;
        let bytes = bytes?;
        if bytes.is_empty() {
            return Err(SinanError::Device(format!(
                "screenshot from {} is empty",
                self.serial
            )));
        }
        Ok(bytes)
    }

    async fn ui_tree(&self) -> SinanResult<RawUiTree> {
        self.hdc_checked(&["shell", "uitest", "dumpLayout", "-p", REMOTE_LAYOUT])
            .await?;
        let out = self.hdc(&["shell", "cat", REMOTE_LAYOUT]).await?;
        Ok(RawUiTree::from_raw_dump(Platform::Harmony, &out.stdout_lossy()))
    }

    async fn input_text(&self, text: &str) -> SinanResult<bool> {
        let out = self
            .hdc(&["shell", "uitest", "uiInput", "inputText", text])
            .await?;
        Ok(out.success)
    }
}
