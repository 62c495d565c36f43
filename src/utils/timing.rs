use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "storybook.timing";

const KEYWORD_PREVIEW_CHARS: usize = 300;

/// Timing record for one storybook generation, from request to record.
#[derive(Debug)]
pub struct GenerationTimer {
    storybook_id: String,
    name: String,
    age: u32,
    keywords: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl GenerationTimer {
    pub fn new(storybook_id: &str, name: &str, age: u32, keywords: &str) -> Self {
        let keywords = keywords.replace('\n', " ");
        let keywords = if keywords.chars().count() > KEYWORD_PREVIEW_CHARS {
            keywords.chars().take(KEYWORD_PREVIEW_CHARS).collect()
        } else {
            keywords
        };

        GenerationTimer {
            storybook_id: storybook_id.to_string(),
            name: name.to_string(),
            age,
            keywords,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_started(&self) {
        info!(
            target: TIMING_TARGET,
            "event=generation_started storybook_id={} name={:?} age={} started_at={} keywords={:?}",
            self.storybook_id,
            self.name,
            self.age,
            self.started_at.to_rfc3339(),
            self.keywords
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=generation_completed storybook_id={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.storybook_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

pub fn start_generation_timer(storybook_id: &str, name: &str, age: u32, keywords: &str) -> GenerationTimer {
    let timer = GenerationTimer::new(storybook_id, name, age, keywords);
    timer.log_started();
    timer
}

pub fn complete_generation_timer(timer: &mut GenerationTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_capability_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=capability_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_err() { "error" } else { "success" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=capability_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
