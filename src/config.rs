use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{SinanError, SinanResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Alternate phrasings tried in order when a tap target cannot be located.
    #[serde(default = "default_alternates")]
    pub alternates: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pause before every retry attempt after the first.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Pause between a physical action and the screenshot attached to its report.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_true")]
    pub stop_on_error: bool,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Where screenshots of unresolved taps are written. Defaults to the user data dir.
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
    /// Append every action result to a JSONL session journal.
    #[serde(default)]
    pub journal: bool,
    #[serde(default)]
    pub scroll: SwipeGesture,
}

impl ExecutionConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.diagnostics_dir
            .clone()
            .unwrap_or_else(|| data_dir_or_cwd().join("diagnostics"))
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            stop_on_error: true,
            default_max_retries: default_max_retries(),
            diagnostics_dir: None,
            journal: false,
            scroll: SwipeGesture::default(),
        }
    }
}

/// Fixed gesture used by SWIPE and SCROLL actions: drag from the lower middle of
/// the screen upwards to reveal content below the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeGesture {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub duration_ms: u32,
}

impl Default for SwipeGesture {
    fn default() -> Self {
        Self {
            x1: 540,
            y1: 1200,
            x2: 540,
            y2: 600,
            duration_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible server, e.g. `http://127.0.0.1:8001/v1`.
    #[serde(default = "default_vision_api_base")]
    pub api_base: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    /// Optional key stored in config.toml (overridden by env `SINAN_VISION_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub coordinate_space: CoordinateSpace,
}

impl VisionConfig {
    pub fn resolved_api_key(&self) -> String {
        std::env::var("SINAN_VISION_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
            .unwrap_or_else(|| "dummy".to_string())
    }
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_vision_api_base(),
            model: default_vision_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            coordinate_space: CoordinateSpace::default(),
        }
    }
}

/// How the grounding model expresses bounding boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Screenshot pixels.
    #[default]
    Absolute,
    /// 0–1000 on both axes, scaled to the screenshot size.
    #[serde(rename = "normalized_1000")]
    Normalized1000,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_vision_api_base() -> String {
    "http://127.0.0.1:8001/v1".to_string()
}

fn default_vision_model() -> String {
    "MAI-UI-8B".to_string()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    100
}

fn default_interval_secs() -> u64 {
    2
}

pub fn default_alternates() -> HashMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 4] = [
        ("外卖", &["外卖按钮", "外卖入口", "美团外卖"]),
        ("蔬菜水果", &["水果蔬菜", "生鲜", "蔬菜水果分类", "水果"]),
        ("草莓", &["新鲜草莓", "草莓水果", "红颜草莓"]),
        ("加入购物车", &["加入购物袋", "加购", "添加"]),
    ];
    table
        .iter()
        .map(|(target, alts)| {
            (
                target.to_string(),
                alts.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect()
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Loads `config.toml` from the executable's directory or the working directory.
/// A missing file is not an error: every section has defaults.
pub fn load_config() -> SinanResult<AppConfig> {
    let Some(path) = resolve_config_path() else {
        tracing::info!("no config.toml found, using defaults");
        return Ok(AppConfig::default_with_alternates());
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), vision = config.vision.enabled, "config loaded");
    Ok(config)
}

pub fn parse_config(content: &str) -> SinanResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Rejects values that parse but cannot drive a session.
    pub fn validate(&self) -> SinanResult<()> {
        if self.monitor.interval_secs == 0 {
            return Err(SinanError::Config("monitor.interval_secs must be at least 1".into()));
        }
        if self.vision.enabled && self.vision.api_base.trim().is_empty() {
            return Err(SinanError::Config("vision.api_base is empty but vision is enabled".into()));
        }
        Ok(())
    }

    /// `Default` leaves the alternates table empty; this seeds the built-in one.
    pub fn default_with_alternates() -> Self {
        Self {
            alternates: default_alternates(),
            ..Self::default()
        }
    }
}

/// Returns `<data_local_dir>/sinan`, falling back to the current working directory.
pub fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        return base.join("sinan");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.execution.retry_delay_ms, 1000);
        assert_eq!(cfg.execution.settle_delay_ms, 500);
        assert!(cfg.execution.stop_on_error);
        assert_eq!(cfg.execution.scroll, SwipeGesture::default());
        assert!(!cfg.vision.enabled);
        assert_eq!(cfg.monitor.interval_secs, 2);
        assert_eq!(cfg.alternates["外卖"].len(), 3);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [execution]
            retry_delay_ms = 0
            stop_on_error = false

            [execution.scroll]
            x1 = 100
            y1 = 900
            x2 = 100
            y2 = 300
            duration_ms = 250

            [vision]
            enabled = true
            model = "ui-tars"
            coordinate_space = "normalized_1000"

            [alternates]
            "Settings" = ["Preferences"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.execution.retry_delay_ms, 0);
        assert!(!cfg.execution.stop_on_error);
        assert_eq!(cfg.execution.scroll.y2, 300);
        assert!(cfg.vision.enabled);
        assert_eq!(cfg.vision.coordinate_space, CoordinateSpace::Normalized1000);
        assert_eq!(cfg.alternates.len(), 1);
        assert_eq!(cfg.alternates["Settings"], vec!["Preferences".to_string()]);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse_config("[execution\nretry_delay_ms = ").is_err());
    }

    #[test]
    fn unusable_values_are_config_errors() {
        let err = parse_config("[monitor]\ninterval_secs = 0").unwrap_err();
        assert!(matches!(err, SinanError::Config(_)));

        let err = parse_config("[vision]\nenabled = true\napi_base = \"  \"").unwrap_err();
        assert!(err.to_string().contains("vision.api_base"));

        assert!(parse_config("[vision]\napi_base = \"\"").is_ok());
    }
}
