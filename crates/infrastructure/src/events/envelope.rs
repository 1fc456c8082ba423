use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueEventKind {
    QueueUpdate,
    TasksAdded,
    TaskHistoryUpdate,
    QueuesCleared,
    TaskProcessing,
    TaskCompleted,
    TaskError,
    WorkflowCreated,
    WorkflowExecutionUpdate,
}

impl QueueEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueEventKind::QueueUpdate => "queue-update",
            QueueEventKind::TasksAdded => "tasks-added",
            QueueEventKind::TaskHistoryUpdate => "task-history-update",
            QueueEventKind::QueuesCleared => "queues-cleared",
            QueueEventKind::TaskProcessing => "task-processing",
            QueueEventKind::TaskCompleted => "task-completed",
            QueueEventKind::TaskError => "task-error",
            QueueEventKind::WorkflowCreated => "workflow-created",
            QueueEventKind::WorkflowExecutionUpdate => "workflow-execution-update",
        }
    }
}

impl fmt::Display for QueueEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件信封 `{type, data, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}
