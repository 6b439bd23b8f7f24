//! Android driver over `adb`.
use async_trait::async_trait;

use crate::device::shell;
use crate::device::traits::{Device, Platform};
use crate::errors::{SinanError, SinanResult};
use crate::perception::ui_tree::RawUiTree;

const DUMP_PATH: &str = "/sdcard/ui.xml";

pub struct AndroidDevice {
    serial: String,
}

impl AndroidDevice {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }

    async fn adb(&self, args: &[&str]) -> SinanResult<shell::CommandOutput> {
        let mut full = vec!["-s", self.serial.as_str()];
        full.extend_from_slice(args);
        shell::run("adb", &full).await
    }
}

#[async_trait]
impl Device for AndroidDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn platform(&self) -> Platform {
        Platform::Android
    }

    async fn connect(&self) -> SinanResult<bool> {
        let ok = self.adb(&["get-state"]).await?.success;
        tracing::info!(serial = %self.serial, connected = ok, "adb connect");
        Ok(ok)
    }

    async fn disconnect(&self) {
        tracing::debug!(serial = %self.serial, "adb released");
    }

    async fn tap(&self, x: i32, y: i32) -> SinanResult<bool> {
        let (x, y) = (x.to_string(), y.to_string());
        Ok(self.adb(&["shell", "input", "tap", &x, &y]).await?.success)
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
            .adb(&[
                "shell", "input", "swipe", &args[0], &args[1], &args[2], &args[3], &duration,
            ])
            .await?;
        Ok(out.success)
    }

    async fn screenshot(&self) -> SinanResult<Vec<u8>> {
        let out = self.adb(&["exec-out", "screencap", "-p"]).await?;
        if !out.success || out.stdout.is_empty() {
            return Err(SinanError::Device(format!(
                "screencap on {} failed: {}",
                self.serial, out.stderr
            )));
        }
        Ok(out.stdout)
    }

    async fn ui_tree(&self) -> SinanResult<RawUiTree> {
        let dump = self.adb(&["shell", "uiautomator", "dump", DUMP_PATH]).await?;
        if !dump.success {
            return Err(SinanError::Device(format!(
                "uiautomator dump on {} failed: {}",
                self.serial, dump.stderr
            )));
        }
        let out = self.adb(&["shell", "cat", DUMP_PATH]).await?;
        Ok(RawUiTree::from_raw_dump(Platform::Android, &out.stdout_lossy()))
    }

    async fn input_text(&self, text: &str) -> SinanResult<bool> {
        let escaped = escape_input_text(text);
        Ok(self.adb(&["shell", "input", "text", &escaped]).await?.success)
    }
}

/// `input text` treats spaces as argument separators and the device shell
/// re-parses quotes.
fn escape_input_text(text: &str) -> String {
    text.replace(' ', "%s").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_text_escaping() {
        assert_eq!(escape_input_text("hello world"), "hello%sworld");
        assert_eq!(escape_input_text("it's"), "it\\'s");
        assert_eq!(escape_input_text("草莓"), "草莓");
    }
}
