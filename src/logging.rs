use chrono::{DateTime, Utc};
use colored::*;
use std::panic;
use std::path::Path;
use tracing::{error, info, warn, Span};
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

pub const DEFAULT_LOG_FILTER: &str = "streamgate=info";
pub const LOG_FILE_PREFIX: &str = "streamgate.log";

/// Installs the global subscriber: env filter, daily rolling file, stderr and
/// span-trace capture for `ObservedError`. Keep the guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init_tracing(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    std::fs::create_dir_all(log_dir)?;

    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => DEFAULT_LOG_FILTER.into(),
    };

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_error::ErrorLayer::default())
        .init();

    Ok(guard)
}

/// Sets up a global panic hook that logs panics using tracing.
pub fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            target: "panic",
            message = %message,
            location = %location,
            "FATAL: Application panicked"
        );

        original_hook(panic_info);
    }));
}

/// Span covering one upstream request. Every line logged inside it, including
/// the [`StreamSummary`] line, carries the `request_id` field.
pub fn request_span(model: &str) -> Span {
    let request_id = Uuid::new_v4().to_string();
    tracing::info_span!("request", request_id = %request_id, model = %model)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub started_at: DateTime<Utc>,
    pub fragments: usize,
    pub deltas: usize,
    pub parse_failures: usize,
    pub merged: usize,
    pub text_chars: usize,
    pub tool_call_chunks: usize,
}

impl Default for StreamSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            fragments: 0,
            deltas: 0,
            parse_failures: 0,
            merged: 0,
            text_chars: 0,
            tool_call_chunks: 0,
        }
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    pub fn record_delta(&mut self, text: &str, has_tool_calls: bool) {
        self.deltas += 1;
        self.text_chars += text.len();
        if has_tool_calls {
            self.tool_call_chunks += 1;
        }
    }

    pub fn log_summary(&self, quota: f32) {
        if self.parse_failures > self.merged {
            warn!(
                "{}",
                format!(
                    "[STREAM END] {} fragment(s) never decoded, even merged",
                    self.parse_failures - self.merged
                )
                .yellow()
            );
        }
        info!(
            target: "flight_recorder",
            "[STREAM END] Elapsed: {}ms | Fragments: {} | Deltas: {} | Merged: {} | ParseFailures: {} | Tools: {} | Text: {} chars | Quota: {:.4}",
            self.elapsed_ms(),
            self.fragments,
            self.deltas,
            self.merged,
            self.parse_failures,
            self.tool_call_chunks,
            self.text_chars,
            quota
        );
    }
}
