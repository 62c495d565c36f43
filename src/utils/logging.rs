use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::utils::timing::TIMING_TARGET;

/// Span carrying the storybook id; every pipeline event for one generation
/// is recorded inside it.
pub const STORYBOOK_SPAN: &str = "storybook";
/// Child span for one scene's prompt and render.
pub const SCENE_SPAN: &str = "scene";

const PIPELINE_LOG: &str = "storybook";
const TIMING_LOG: &str = "timing";

pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn pipeline_filter(level: LevelFilter) -> Targets {
    Targets::new()
        .with_default(level)
        .with_target(TIMING_TARGET, LevelFilter::OFF)
        .with_target("hyper", LevelFilter::WARN)
        .with_target("hyper_util", LevelFilter::WARN)
        .with_target("reqwest", LevelFilter::WARN)
}

fn timing_filter() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

/// Daily-rolling `<stem>.log` and `<stem>.jsonl` writers.
fn rolling_pair(
    logs_dir: &Path,
    stem: &str,
    guards: &mut Vec<WorkerGuard>,
) -> (NonBlocking, NonBlocking) {
    let (plain, plain_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, format!("{stem}.log")));
    let (json, json_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, format!("{stem}.jsonl")));
    guards.push(plain_guard);
    guards.push(json_guard);
    (plain, json)
}

/// Console output plus plain and JSON files for pipeline events and for
/// generation timings. JSON lines carry the enclosing storybook/scene span
/// fields so one generation can be filtered by id.
pub fn init_logging(log_level: &str, logs_dir: &Path) -> LoggingGuards {
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory {}: {err}", logs_dir.display());
    }

    let mut guards = Vec::with_capacity(4);
    let (pipeline_writer, pipeline_json_writer) = rolling_pair(logs_dir, PIPELINE_LOG, &mut guards);
    let (timing_writer, timing_json_writer) = rolling_pair(logs_dir, TIMING_LOG, &mut guards);

    let pipeline = pipeline_filter(parse_log_level(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(pipeline.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(pipeline_writer)
                .with_ansi(false)
                .with_filter(pipeline.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(pipeline_json_writer)
                .with_filter(pipeline),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(timing_writer)
                .with_ansi(false)
                .with_filter(timing_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(timing_json_writer)
                .with_filter(timing_filter()),
        )
        .init();

    LoggingGuards { _guards: guards }
}
