//! 测试数据构造器
//!
//! 带合理默认值的构造器，用于不经过存储层直接构造实体。

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use taskq_core::models::{QueueTask, QueueTaskStatus, TaskDefinition};

/// 队列任务构造器
pub struct QueueTaskBuilder {
    task: QueueTask,
}

impl QueueTaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: QueueTask {
                id: "test-task".to_string(),
                queue: "default".to_string(),
                task_type: "webhook_task".to_string(),
                name: "webhook_task".to_string(),
                data: json!({}),
                priority: 0,
                status: QueueTaskStatus::Pending,
                attempts: 0,
                max_attempts: 3,
                error: None,
                created_at: now,
                updated_at: now,
                processed_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_queue(mut self, queue: &str) -> Self {
        self.task.queue = queue.to_string();
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self.task.name = task_type.to_string();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.task.data = data;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn processing(mut self, attempts: i32) -> Self {
        self.task.status = QueueTaskStatus::Processing;
        self.task.attempts = attempts;
        self.task.processed_at = Some(self.task.updated_at);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.task.max_attempts = max_attempts;
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.updated_at = at;
        self
    }

    pub fn build(self) -> QueueTask {
        self.task
    }
}

impl Default for QueueTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 任务定义构造器
pub struct TaskDefinitionBuilder {
    definition: TaskDefinition,
}

impl TaskDefinitionBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            definition: TaskDefinition {
                id: 1,
                name: "test_definition".to_string(),
                task_type: "webhook_task".to_string(),
                data: json!({}),
                is_active: true,
                period_seconds: None,
                cron_expr: None,
                priority: 0,
                max_attempts: 3,
                created_by: None,
                last_run: None,
                next_run: None,
                last_status: None,
                last_error: None,
                run_count: 0,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.definition.id = id;
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.definition.task_type = task_type.to_string();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.definition.data = data;
        self
    }

    pub fn every(mut self, seconds: i64) -> Self {
        self.definition.period_seconds = Some(seconds);
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.definition.cron_expr = Some(expr.to_string());
        self
    }

    pub fn created_by(mut self, user_id: i64) -> Self {
        self.definition.created_by = Some(user_id);
        self
    }

    pub fn next_run(mut self, at: DateTime<Utc>) -> Self {
        self.definition.next_run = Some(at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.definition.is_active = false;
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.definition
    }
}

impl Default for TaskDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
