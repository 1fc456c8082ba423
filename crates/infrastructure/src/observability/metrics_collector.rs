//! Metrics collector for the task queue
//!
//! Metrics are recorded through the `metrics` facade. Without an installed
//! recorder every call is a no-op, so components can always hold a collector.

use metrics::{counter, gauge, histogram, Counter, Histogram};
use tracing::debug;

/// Metrics collector for the task queue
pub struct MetricsCollector {
    tasks_enqueued_total: Counter,
    task_executions_total: Counter,
    task_failures_total: Counter,
    task_retries_total: Counter,
    task_execution_duration: Histogram,
    orphans_recovered_total: Counter,
    scheduler_pass_duration: Histogram,
    definitions_scheduled_total: Counter,
    events_published_total: Counter,
    events_fallback_total: Counter,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_enqueued_total: counter!("taskq_tasks_enqueued_total"),
            task_executions_total: counter!("taskq_task_executions_total"),
            task_failures_total: counter!("taskq_task_failures_total"),
            task_retries_total: counter!("taskq_task_retries_total"),
            task_execution_duration: histogram!("taskq_task_execution_duration_seconds"),
            orphans_recovered_total: counter!("taskq_orphans_recovered_total"),
            scheduler_pass_duration: histogram!("taskq_scheduler_pass_duration_seconds"),
            definitions_scheduled_total: counter!("taskq_definitions_scheduled_total"),
            events_published_total: counter!("taskq_events_published_total"),
            events_fallback_total: counter!("taskq_events_fallback_total"),
        }
    }

    // Queue metrics

    /// Record a task added to a queue
    pub fn record_task_enqueued(&self, queue: &str) {
        self.tasks_enqueued_total.increment(1);
        counter!("taskq_queue_enqueued_total", "queue" => queue.to_string()).increment(1);
    }

    /// Update the pending depth of a queue
    pub fn update_queue_depth(&self, queue: &str, depth: u64) {
        gauge!("taskq_queue_depth", "queue" => queue.to_string()).set(depth as f64);
    }

    // Task execution metrics

    /// Record a terminal task execution
    pub fn record_task_execution(&self, task_type: &str, status: &str, duration_seconds: f64) {
        self.task_executions_total.increment(1);
        self.task_execution_duration.record(duration_seconds);
        counter!(
            "taskq_task_outcomes_total",
            "task_type" => task_type.to_string(),
            "status" => status.to_string()
        )
        .increment(1);

        debug!(
            task_type = task_type,
            status = status,
            duration_seconds = duration_seconds,
            "Task execution recorded"
        );
    }

    /// Record a failed attempt
    pub fn record_task_failure(&self, task_type: &str) {
        self.task_failures_total.increment(1);
        counter!("taskq_task_attempt_failures_total", "task_type" => task_type.to_string())
            .increment(1);
    }

    /// Record a task released back to pending for another attempt
    pub fn record_task_retry(&self, task_type: &str, attempt: i32) {
        self.task_retries_total.increment(1);

        debug!(task_type = task_type, attempt = attempt, "Task retry recorded");
    }

    pub fn record_orphans_recovered(&self, count: usize) {
        self.orphans_recovered_total.increment(count as u64);
    }

    // Scheduler metrics

    /// Record one scheduler pass
    pub fn record_scheduler_pass(&self, scheduled: usize, duration_seconds: f64) {
        self.definitions_scheduled_total.increment(scheduled as u64);
        self.scheduler_pass_duration.record(duration_seconds);
    }

    // Event metrics

    pub fn record_event_published(&self, event_type: &str, via_fallback: bool) {
        self.events_published_total.increment(1);
        if via_fallback {
            self.events_fallback_total.increment(1);
        }
        counter!("taskq_events_total", "type" => event_type.to_string()).increment(1);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
