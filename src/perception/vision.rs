//! Vision fallback backed by an OpenAI-compatible chat-completions server
//! (vLLM, LM Studio, …) serving a GUI-grounding model.
//!
//! The model receives the screenshot and a short prompt and is asked to reply
//! with `{"bbox_2d": [x1, y1, x2, y2]}`. Anything else is treated as "not found".
use std::io::Cursor;
use std::sync::LazyLock;

use async_trait::async_trait;
use base64::Engine as _;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{CoordinateSpace, VisionConfig};
use crate::errors::{SinanError, SinanResult};
use crate::perception::traits::VisionDetector;
use crate::perception::types::Detection;

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}").expect("json object regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageUrl {
    url: String,
}

pub struct OpenAiVisionDetector {
    api_base: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    coordinate_space: CoordinateSpace,
    client: reqwest::Client,
}

impl OpenAiVisionDetector {
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.resolved_api_key(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            coordinate_space: config.coordinate_space,
            client: reqwest::Client::new(),
        }
    }

    /// Checks that the server answers `GET /models`.
    pub async fn probe(&self) -> bool {
        let url = format!("{}/models", self.api_base);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), url = %url, "vision endpoint probe rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "vision endpoint unreachable");
                false
            }
        }
    }

    fn build_messages(image: &[u8], instruction: &str) -> Vec<ChatMessage> {
        let mime = image::guess_format(image)
            .map(|f| f.to_mime_type())
            .unwrap_or("image/png");
        let b64 = base64::engine::general_purpose::STANDARD.encode(image);
        vec![ChatMessage {
            role: "user".into(),
            content: vec![
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{mime};base64,{b64}"),
                    },
                },
                ContentPart::Text {
                    text: grounding_prompt(instruction),
                },
            ],
        }]
    }

    fn to_screen_space(&self, bbox: [i32; 4], image: &[u8]) -> SinanResult<[i32; 4]> {
        match self.coordinate_space {
            CoordinateSpace::Absolute => Ok(bbox),
            CoordinateSpace::Normalized1000 => {
                let (w, h) = image::ImageReader::new(Cursor::new(image))
                    .with_guessed_format()?
                    .into_dimensions()
                    .map_err(|e| SinanError::Vision(format!("screenshot dimensions: {e}")))?;
                Ok(scale_from_1000(bbox, w, h))
            }
        }
    }
}

#[async_trait]
impl VisionDetector for OpenAiVisionDetector {
    fn name(&self) -> &str {
        &self.model
    }

    fn is_ready(&self) -> bool {
        !self.api_base.is_empty() && !self.model.is_empty()
    }

    async fn detect(&self, image: &[u8], instruction: &str) -> SinanResult<Option<Detection>> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::build_messages(image, instruction),
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        tracing::debug!(
            model = %self.model,
            instruction = %instruction,
            image_bytes = image.len(),
            "sending grounding request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(SinanError::Vision(format!("{status}: {err_body}")));
        }

        let json: Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();

        let Some(bbox) = parse_bbox_reply(content) else {
            tracing::debug!(reply = %content, "grounding reply carried no bbox");
            return Ok(None);
        };
        let bbox = self.to_screen_space(bbox, image)?;
        let detection = Detection::from_bbox(bbox);
        tracing::info!(instruction = %instruction, ?detection, "vision detection");
        Ok(Some(detection))
    }
}

fn grounding_prompt(instruction: &str) -> String {
    format!(
        "请找到屏幕上\"{instruction}\"的位置。\n\
         返回 JSON 格式：{{\"bbox_2d\": [x1, y1, x2, y2]}}\n\
         其中 (x1, y1) 是左上角坐标，(x2, y2) 是右下角坐标。\n\
         只返回 JSON，不要其他内容。"
    )
}

/// Extracts `bbox_2d` (or `bbox`) from a model reply. The reply may be bare JSON
/// or prose containing a single JSON object.
pub fn parse_bbox_reply(content: &str) -> Option<[i32; 4]> {
    let content = content.trim();
    if content.is_empty() {
        return None;
    }

    let data: Value = serde_json::from_str(content).ok().or_else(|| {
        JSON_OBJECT
            .find(content)
            .and_then(|m| serde_json::from_str(m.as_str()).ok())
    })?;

    let bbox = data
        .get("bbox_2d")
        .filter(|v| !v.is_null())
        .or_else(|| data.get("bbox"))?
        .as_array()?;
    let coords: Vec<i32> = bbox
        .iter()
        .map(|v| v.as_f64().map(|f| f as i32))
        .collect::<Option<_>>()?;
    match coords.as_slice() {
        [x1, y1, x2, y2] => Some([*x1, *y1, *x2, *y2]),
        _ => None,
    }
}

fn scale_from_1000(bbox: [i32; 4], width: u32, height: u32) -> [i32; 4] {
    let sx = |v: i32| (i64::from(v) * i64::from(width) / 1000) as i32;
    let sy = |v: i32| (i64::from(v) * i64::from(height) / 1000) as i32;
    [sx(bbox[0]), sy(bbox[1]), sx(bbox[2]), sy(bbox[3])]
}
