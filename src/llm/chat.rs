use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{CapabilityError, TextCompletion};
use crate::utils::http::{
    redact_secret, retry_delay, should_retry_error, should_retry_status, summarize_error_body,
    truncate_for_log,
};
use crate::utils::timing::log_capability_timing;

static THINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>(.*?)</think>(.*)").expect("valid think regex"));
static CHANNEL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\|.*?\|>").expect("valid channel token regex"));

/// OpenAI-compatible `/chat/completions` client (Groq, OpenRouter, vLLM, ...).
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    top_p: f32,
    timeout: Duration,
    max_attempts: usize,
}

impl ChatCompletionClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        top_p: f32,
        timeout: Duration,
        max_attempts: usize,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            top_p,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    fn build_payload(&self, system_prompt: &str, user_prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": self.temperature,
            "top_p": self.top_p,
        })
    }

    async fn call_chat_api(&self, payload: &Value) -> Result<Value, CapabilityError> {
        debug!("Chat completion request: {}", summarize_payload(payload));

        let url = format!("{}/chat/completions", self.base_url);
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let should_retry = should_retry_error(&err) && attempt < self.max_attempts;
                    let err_text = redact_secret(&err.to_string(), &self.api_key);
                    warn!(
                        "Chat completion request failed to send: {} (timeout={}, connect={}, attempt={}/{}, retrying={})",
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
                    return Err(anyhow!("Chat completion request failed: {}", err_text).into());
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let (message, body_summary) = summarize_error_body(&body);
                let should_retry = should_retry_status(status) && attempt < self.max_attempts;
                warn!(
                    "Chat completion API error: status={}, body={}, retrying={}",
                    status, body_summary, should_retry
                );
                if should_retry {
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
                let detail = message.unwrap_or(body_summary);
                return Err(anyhow!(
                    "Chat completion request failed with status {}: {}",
                    status,
                    detail
                )
                .into());
            }

            let value = response
                .json::<Value>()
                .await
                .map_err(|err| CapabilityError::Malformed(err.to_string()))?;
            debug!("Chat completion response received for model={}", self.model);
            return Ok(value);
        }
    }
}

#[async_trait]
impl TextCompletion for ChatCompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, CapabilityError> {
        let payload = self.build_payload(system_prompt, user_prompt);
        log_capability_timing("chat", &self.model, "complete", None, || async {
            let response = self.call_chat_api(&payload).await?;
            let content = extract_message_content(&response);
            if content.trim().is_empty() {
                warn!(
                    "Chat completion response had empty content: {}",
                    truncate_for_log(&response.to_string(), 2000)
                );
                return Err(CapabilityError::Empty);
            }
            Ok(content)
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let user_chars = payload
        .pointer("/messages/1/content")
        .and_then(|v| v.as_str())
        .map(|v| v.chars().count())
        .unwrap_or(0);

    format!(
        "model={}, messages={}, user_chars={}",
        model, message_count, user_chars
    )
}

/// Drops reasoning preambles some models emit before the answer.
fn strip_reasoning(content: &str) -> String {
    if let Some(last_pos) = content.rfind("<|message|>") {
        let final_text = &content[last_pos + "<|message|>".len()..];
        return CHANNEL_TOKEN_RE.replace_all(final_text, "").trim().to_string();
    }
    if let Some(caps) = THINK_RE.captures(content) {
        let final_text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        return final_text.trim().to_string();
    }
    content.trim().to_string()
}

fn extract_message_content(response: &Value) -> String {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    strip_reasoning(content)
}
