use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;

const RETRY_BASE_DELAY_MS: u64 = 900;

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| anyhow!("Failed to build HTTP client: {}", err))
}

pub fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

pub fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

pub fn retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

pub fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

/// Pulls a human-readable message out of an API error body, plus a truncated
/// copy of the body for logs.
pub fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("error")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            })
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

pub fn redact_secret(text: &str, secret: &str) -> String {
    let secret = secret.trim();
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, "[redacted]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarizes_openai_style_error() {
        let (message, summary) =
            summarize_error_body(r#"{"error":{"message":"model overloaded","type":"server"}}"#);
        assert_eq!(message.as_deref(), Some("model overloaded"));
        assert!(summary.contains("overloaded"));
    }

    #[test]
    fn summarizes_webui_style_error() {
        let (message, _) = summarize_error_body(r#"{"error":"OutOfMemoryError","detail":"x"}"#);
        assert_eq!(message.as_deref(), Some("OutOfMemoryError"));
    }

    #[test]
    fn summarizes_plain_and_empty_bodies() {
        assert_eq!(summarize_error_body("  ").1, "empty response body");
        let (message, summary) = summarize_error_body("Bad Gateway");
        assert!(message.is_none());
        assert_eq!(summary, "Bad Gateway");
    }

    #[test]
    fn retries_only_transient_statuses() {
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(should_retry_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!should_retry_status(StatusCode::UNAUTHORIZED));
        assert!(!should_retry_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn retry_delay_grows_linearly() {
        assert_eq!(retry_delay(0), Duration::from_millis(900));
        assert_eq!(retry_delay(1), Duration::from_millis(900));
        assert_eq!(retry_delay(3), Duration::from_millis(2700));
    }

    #[test]
    fn truncates_by_characters() {
        assert_eq!(truncate_for_log("héllo", 10), "héllo");
        assert_eq!(truncate_for_log("héllo", 2), "hé... (truncated)");
    }

    #[test]
    fn redacts_keys() {
        assert_eq!(
            redact_secret("url?key=abc123&x=1", "abc123"),
            "url?key=[redacted]&x=1"
        );
        assert_eq!(redact_secret("nothing", " "), "nothing");
    }
}
