use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::llm::{CapabilityError, ImageRenderer, RenderRequest};
use crate::utils::http::{
    redact_secret, retry_delay, should_retry_error, should_retry_status, summarize_error_body,
    truncate_for_log,
};
use crate::utils::timing::log_capability_timing;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const IMAGE_SYSTEM_INSTRUCTION: &str =
    "Generate an image based on the prompt. CRITICAL: response be an image, NOT TEXT.";
const SUPPORTED_ASPECT_RATIOS: [(&str, u32, u32); 10] = [
    ("1:1", 1, 1),
    ("2:3", 2, 3),
    ("3:2", 3, 2),
    ("3:4", 3, 4),
    ("4:3", 4, 3),
    ("4:5", 4, 5),
    ("5:4", 5, 4),
    ("9:16", 9, 16),
    ("16:9", 16, 9),
    ("21:9", 21, 9),
];

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// Gemini image model behind the render capability. The model has no notion
/// of steps or guidance; geometry is requested through the aspect ratio and
/// the negative prompt is folded into the instruction text.
#[derive(Debug, Clone)]
pub struct GeminiImageClient {
    http: Client,
    api_key: String,
    model: String,
    timeout: Duration,
    max_attempts: usize,
}

impl GeminiImageClient {
    pub fn new(
        http: Client,
        api_key: &str,
        model: &str,
        timeout: Duration,
        max_attempts: usize,
    ) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    fn build_payload(&self, request: &RenderRequest) -> Value {
        let mut text = request.prompt.trim().to_string();
        if !request.negative_prompt.trim().is_empty() {
            text.push_str("\n\nAvoid: ");
            text.push_str(request.negative_prompt.trim());
        }

        let mut image_config = Map::new();
        image_config.insert(
            "aspectRatio".to_string(),
            json!(nearest_aspect_ratio(request.width, request.height)),
        );

        json!({
            "systemInstruction": { "parts": [{ "text": IMAGE_SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": Value::Object(image_config),
            },
            "safetySettings": build_safety_settings(),
        })
    }

    async fn call_gemini_api(&self, payload: &Value) -> Result<GeminiResponse, CapabilityError> {
        let url = format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                target: "llm.gemini",
                model = %self.model,
                generation_config = %payload["generationConfig"]
            );
        }

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err_text = redact_secret(&err.to_string(), &self.api_key);
                    let should_retry = should_retry_error(&err) && attempt < self.max_attempts;
                    warn!(
                        "Gemini request failed to send: {} (timeout={}, connect={}, status={:?}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        err.status(),
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(CapabilityError::Timeout);
                    }
                    return Err(anyhow!("Gemini request failed: {}", err_text).into());
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry = should_retry_status(status) && attempt < self.max_attempts;
                warn!(
                    "Gemini API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if tracing::enabled!(tracing::Level::DEBUG) {
                    debug!(
                        target: "llm.gemini",
                        status = %status,
                        body = %truncate_for_log(&body, 4000)
                    );
                }
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(anyhow!(
                    "Gemini request failed with status {}: {}",
                    status,
                    detail
                )
                .into());
            }

            return response
                .json::<GeminiResponse>()
                .await
                .map_err(|err| CapabilityError::Malformed(err.to_string()));
        }
    }
}

#[async_trait]
impl ImageRenderer for GeminiImageClient {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, CapabilityError> {
        let payload = self.build_payload(request);
        log_capability_timing("gemini", &self.model, "generate_image", None, || async {
            let response = self.call_gemini_api(&payload).await?;
            let (images, text) = extract_images_from_response(response);
            match images.into_iter().next() {
                Some(image) => Ok(image),
                None if text.trim().is_empty() => Err(CapabilityError::Empty),
                None => Err(CapabilityError::Malformed(format!(
                    "model answered with text instead of an image: {}",
                    truncate_for_log(&text, 200)
                ))),
            }
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn build_safety_settings() -> Vec<Value> {
    let threshold = "BLOCK_MEDIUM_AND_ABOVE";
    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn nearest_aspect_ratio(width: u32, height: u32) -> &'static str {
    if width == 0 || height == 0 {
        return "1:1";
    }
    let target = width as f64 / height as f64;
    SUPPORTED_ASPECT_RATIOS
        .iter()
        .min_by(|a, b| {
            let da = (a.1 as f64 / a.2 as f64 - target).abs();
            let db = (b.1 as f64 / b.2 as f64 - target).abs();
            da.total_cmp(&db)
        })
        .map(|(label, _, _)| *label)
        .unwrap_or("1:1")
}

/// Returns decoded inline images plus any text the model sent alongside.
fn extract_images_from_response(response: GeminiResponse) -> (Vec<Vec<u8>>, String) {
    let mut images = Vec::new();
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        let Some(parts) = candidate.content.and_then(|content| content.parts) else {
            continue;
        };
        for part in parts {
            match part {
                GeminiPart::InlineData { inline_data } => {
                    if !inline_data.mime_type.starts_with("image/") {
                        continue;
                    }
                    match general_purpose::STANDARD.decode(inline_data.data) {
                        Ok(bytes) if !bytes.is_empty() => images.push(bytes),
                        Ok(_) => {}
                        Err(err) => warn!("Skipping undecodable Gemini image part: {}", err),
                    }
                }
                GeminiPart::Text { text } => {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
            }
        }
    }
    (images, text_parts.join("\n"))
}
