//! # Structured Logging
//!
//! Environment-aware `tracing` setup for the scheduler and the binaries built on it.
//!
//! - level: `RUST_LOG` when set, otherwise derived from `TASKER_ENV`/`APP_ENV`
//!   (`test` and `development` log at debug, `production` at info)
//! - format: human-readable by default, JSON lines when `TASKER_LOG_FORMAT=json`

use crate::models::TaskId;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// An already installed global subscriber (for example one set up by a test harness or
/// the embedding application) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let layer = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(false)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .boxed()
        };

        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized, keeping it");
            return;
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `TASKER_ENV`, falling back to `APP_ENV`.
fn get_environment() -> String {
    std::env::var("TASKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

fn use_json_format() -> bool {
    std::env::var("TASKER_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log a task lifecycle operation with the fields the scheduler uses elsewhere.
pub fn log_task_operation(
    operation: &str,
    task_id: Option<TaskId>,
    task_type: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    let task_id = task_id.map(|id| id.to_string());
    tracing::info!(
        operation = %operation,
        task_id = task_id.as_deref(),
        task_type = task_type,
        status = %status,
        details = details,
        "TASK_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        "ERROR"
    );
}
