//! Structured logging utilities
//!
//! Event-keyed log helpers for the queue lifecycle. Every entry carries an
//! `event` field so log pipelines can filter without parsing messages.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log a task added to a queue
    pub fn log_task_enqueued(task_id: &str, queue: &str, task_type: &str, priority: i32) {
        debug!(
            event = "task_enqueued",
            task.id = task_id,
            task.queue = queue,
            task.task_type = task_type,
            task.priority = priority,
            "Task enqueued"
        );
    }

    /// Log a definition scheduled into a queue
    pub fn log_definition_scheduled(
        definition_id: i64,
        name: &str,
        queue: &str,
        next_run: DateTime<Utc>,
    ) {
        info!(
            event = "definition_scheduled",
            definition.id = definition_id,
            definition.name = name,
            task.queue = queue,
            definition.next_run = %next_run,
            "Task definition scheduled"
        );
    }

    /// Log task execution start
    pub fn log_task_execution_start(
        task_id: &str,
        task_type: &str,
        queue: &str,
        attempt: i32,
        max_attempts: i32,
        worker_id: &str,
    ) {
        info!(
            event = "task_claimed",
            task.id = task_id,
            task.task_type = task_type,
            task.queue = queue,
            task.attempt = attempt,
            task.max_attempts = max_attempts,
            worker.id = worker_id,
            "Task execution started"
        );
    }

    /// Log task execution completion
    pub fn log_task_execution_complete(
        task_id: &str,
        task_type: &str,
        worker_id: &str,
        success: bool,
        duration_ms: i64,
        error_message: Option<&str>,
    ) {
        if success {
            info!(
                event = "task_execution_complete",
                task.id = task_id,
                task.task_type = task_type,
                worker.id = worker_id,
                task.success = success,
                task.duration_ms = duration_ms,
                "Task execution completed successfully"
            );
        } else {
            error!(
                event = "task_execution_failed",
                task.id = task_id,
                task.task_type = task_type,
                worker.id = worker_id,
                task.success = success,
                task.duration_ms = duration_ms,
                task.error = error_message.unwrap_or("Unknown error"),
                "Task execution failed"
            );
        }
    }

    /// Log task retry
    pub fn log_task_retry(task_id: &str, task_type: &str, attempt: i32, max_attempts: i32, reason: &str) {
        warn!(
            event = "task_retry_scheduled",
            task.id = task_id,
            task.task_type = task_type,
            task.attempt = attempt,
            task.max_attempts = max_attempts,
            task.retry_reason = reason,
            "Task released for retry"
        );
    }

    /// Log the end of one scheduler pass
    pub fn log_scheduler_pass_complete(due: usize, scheduled: usize, failed: usize, duration_ms: u64) {
        info!(
            event = "scheduler_pass_complete",
            scheduler.due = due,
            scheduler.scheduled = scheduled,
            scheduler.failed = failed,
            scheduler.duration_ms = duration_ms,
            "Scheduler pass completed"
        );
    }

    /// Log orphan recovery
    pub fn log_orphans_recovered(worker_id: &str, reset: usize, abandoned: usize, startup: bool) {
        warn!(
            event = "orphans_recovered",
            worker.id = worker_id,
            orphans.reset = reset,
            orphans.abandoned = abandoned,
            orphans.startup = startup,
            "Orphaned tasks recovered"
        );
    }

    /// Log database operation
    pub fn log_database_operation(
        operation: &str,
        table: &str,
        duration_ms: u64,
        affected_rows: Option<u64>,
    ) {
        debug!(
            event = "database_operation",
            db.operation = operation,
            db.table = table,
            db.duration_ms = duration_ms,
            db.affected_rows = affected_rows,
            "Database operation completed"
        );
    }

    /// Log a best-effort queue operation that failed and was degraded
    pub fn log_queue_degraded(driver: &str, operation: &str, queue: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "queue_degraded",
            mq.driver = driver,
            mq.operation = operation,
            mq.queue = queue,
            error.message = %error,
            "Queue operation failed, returning empty result"
        );
    }

    /// Log a failed iteration of a background loop; the loop keeps running
    pub fn log_loop_error(component: &str, operation: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "loop_error",
            component.name = component,
            component.operation = operation,
            error.message = %error,
            "Background loop iteration failed"
        );
    }

    /// Log a backend connection with any password masked
    pub fn log_backend_connected(backend: &str, url: &str) {
        info!(
            event = "backend_connected",
            backend.kind = backend,
            backend.url = %mask_url(url),
            "Backend connection established"
        );
    }
}

/// 屏蔽连接URL中的密码
pub fn mask_url(url: &str) -> String {
    let Some(authority_start) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at_pos) = url[authority_start..].find('@').map(|i| i + authority_start) else {
        return url.to_string();
    };
    match url[authority_start..at_pos].find(':') {
        Some(colon) => {
            let mut masked = url.to_string();
            masked.replace_range(authority_start + colon + 1..at_pos, "***");
            masked
        }
        None => url.to_string(),
    }
}
