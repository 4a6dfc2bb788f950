//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the StudyGroupFinder service. Best-effort failures and degraded reads
//! have dedicated helpers so operators can filter them by target.

use tracing::{info, warn, debug};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use crate::config::LoggingConfig;
use crate::utils::errors::{StudyGroupError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file writer when dropped and must be held
/// for the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.file_path, "studygroup.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
        .try_init()
        .map_err(|e| StudyGroupError::Config(format!("Failed to install subscriber: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log event management actions
pub fn log_event_action(event_id: &str, action: &str, user_id: &str, details: Option<&str>) {
    info!(
        event_id = event_id,
        action = action,
        user_id = user_id,
        details = details,
        "Event action performed"
    );
}

/// Log membership changes on an event
pub fn log_membership_change(event_id: &str, user_id: &str, action: &str, participants: u32) {
    info!(
        event_id = event_id,
        user_id = user_id,
        action = action,
        current_participants = participants,
        "Membership changed"
    );
}

/// Log a suppressed failure of a best-effort step
pub fn log_best_effort_failure(step: &str, key: &str, error: &StudyGroupError) {
    warn!(
        target: "best_effort",
        step = step,
        key = key,
        error = %error,
        "Best-effort step failed"
    );
}

/// Log a read failure that was collapsed to an empty or absent result
pub fn log_degraded_read(operation: &str, key: &str, error: &StudyGroupError) {
    warn!(
        target: "degraded_read",
        operation = operation,
        key = key,
        error = %error,
        recoverable = error.is_recoverable(),
        "Read failed, returning empty result"
    );
}

/// Log optimistic transaction conflicts
pub fn log_transaction_conflict(event_id: &str, attempt: u32, backoff_ms: u64) {
    debug!(
        event_id = event_id,
        attempt = attempt,
        backoff_ms = backoff_ms,
        "Optimistic transaction conflict, retrying"
    );
}

/// Log database operations
pub fn log_database_operation(operation: &str, table: &str, duration_ms: u64, success: bool) {
    if success {
        debug!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation completed"
        );
    } else {
        warn!(
            operation = operation,
            table = table,
            duration_ms = duration_ms,
            "Database operation failed"
        );
    }
}
