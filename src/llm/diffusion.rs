use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{CapabilityError, ImageRenderer, RenderRequest};
use crate::utils::http::{
    redact_secret, retry_delay, should_retry_error, should_retry_status, summarize_error_body,
    truncate_for_log,
};
use crate::utils::timing::log_capability_timing;

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Client for a Stable Diffusion WebUI style `/sdapi/v1/txt2img` endpoint.
#[derive(Debug, Clone)]
pub struct DiffusionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    max_attempts: usize,
}

impl DiffusionClient {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
        max_attempts: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    fn build_payload(&self, request: &RenderRequest) -> Value {
        let mut payload = json!({
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "width": request.width,
            "height": request.height,
            "steps": request.steps,
            "cfg_scale": request.guidance_scale,
            "batch_size": 1,
            "n_iter": 1,
        });
        if !self.model.trim().is_empty() {
            payload["override_settings"] = json!({ "sd_model_checkpoint": self.model });
        }
        payload
    }

    async fn call_txt2img(&self, payload: &Value) -> Result<Txt2ImgResponse, CapabilityError> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);
        debug!(
            target: "llm.diffusion",
            model = %self.model,
            prompt = %truncate_for_log(payload["prompt"].as_str().unwrap_or(""), 200)
        );

        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let mut builder = self.http.post(&url).timeout(self.timeout).json(payload);
            if !self.api_key.trim().is_empty() {
                builder = builder.bearer_auth(&self.api_key);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    let should_retry = should_retry_error(&err) && attempt < self.max_attempts;
                    let err_text = redact_secret(&err.to_string(), &self.api_key);
                    warn!(
                        "Diffusion request failed to send: {} (timeout={}, connect={}, attempt={}/{}, retrying={})",
                        err_text,
                        err.is_timeout(),
                        err.is_connect(),
                        attempt,
                        self.max_attempts,
                        should_retry
                    );
                    if should_retry {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    if err.is_timeout() {
                        return Err(CapabilityError::Timeout);
                    }
                    return Err(anyhow!("Diffusion request failed: {}", err_text).into());
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry = should_retry_status(status) && attempt < self.max_attempts;
                warn!(
                    "Diffusion API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(anyhow!(
                    "Diffusion request failed with status {}: {}",
                    status,
                    detail
                )
                .into());
            }

            return response
                .json::<Txt2ImgResponse>()
                .await
                .map_err(|err| CapabilityError::Malformed(err.to_string()));
        }
    }
}

/// Decodes the first image of a txt2img response. WebUI returns bare base64,
/// some proxies prefix a data URL.
fn decode_first_image(response: Txt2ImgResponse) -> Result<Vec<u8>, CapabilityError> {
    let Some(encoded) = response.images.into_iter().next() else {
        return Err(CapabilityError::Empty);
    };
    let payload = match encoded.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => encoded.as_str(),
    };
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| CapabilityError::Malformed(format!("invalid base64 image: {err}")))?;
    if bytes.is_empty() {
        return Err(CapabilityError::Empty);
    }
    Ok(bytes)
}

#[async_trait]
impl ImageRenderer for DiffusionClient {
    async fn render(&self, request: &RenderRequest) -> Result<Vec<u8>, CapabilityError> {
        let payload = self.build_payload(request);
        let metadata = json!({
            "width": request.width,
            "height": request.height,
            "steps": request.steps,
            "guidance_scale": request.guidance_scale,
        });
        log_capability_timing("diffusion", &self.model, "txt2img", Some(metadata), || async {
            let response = self.call_txt2img(&payload).await?;
            decode_first_image(response)
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
