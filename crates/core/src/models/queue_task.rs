use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchedulerError;

/// 默认优先级
pub const DEFAULT_PRIORITY: i32 = 0;
/// 默认最大尝试次数
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// 任务负载中约定使用的字段名
pub mod payload_keys {
    /// 来源任务定义ID
    pub const TASK_DEFINITION_ID: &str = "task_definition_id";
    /// 预先创建的执行历史ID，存在时终态写入更新该记录
    pub const HISTORY_ID: &str = "history_id";
    /// 创建者用户ID，决定执行身份
    pub const CREATED_BY: &str = "created_by";
    /// 手动触发标记
    pub const MANUAL: &str = "manual";
    /// 手动触发的用户ID，终态时向其发送通知
    pub const TRIGGERED_BY: &str = "triggered_by";
}

/// 队列任务状态
///
/// 队列中只存在两种状态：等待中与处理中。
/// 终态任务会从队列中删除，结果记录在执行历史中。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueTaskStatus {
    Pending,
    Processing,
}

impl QueueTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueTaskStatus::Pending => "pending",
            QueueTaskStatus::Processing => "processing",
        }
    }
}

impl fmt::Display for QueueTaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueTaskStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueTaskStatus::Pending),
            "processing" => Ok(QueueTaskStatus::Processing),
            other => Err(SchedulerError::Serialization(format!(
                "未知的队列任务状态: {other}"
            ))),
        }
    }
}

/// 队列任务
///
/// 一次待执行（或正在执行）的工作单元。`attempts` 记录已经开始的尝试次数，
/// 每次认领时加一，且永远不超过 `max_attempts`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: String,
    pub queue: String,
    pub task_type: String,
    pub name: String,
    pub data: Value,
    pub priority: i32,
    pub status: QueueTaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl QueueTask {
    /// 负载中的任务定义ID
    pub fn definition_id(&self) -> Option<i64> {
        self.data
            .get(payload_keys::TASK_DEFINITION_ID)
            .and_then(Value::as_i64)
    }

    /// 负载中预先创建的执行历史ID
    pub fn history_id(&self) -> Option<i64> {
        self.data.get(payload_keys::HISTORY_ID).and_then(Value::as_i64)
    }

    /// 负载中的创建者用户ID
    pub fn created_by(&self) -> Option<i64> {
        self.data.get(payload_keys::CREATED_BY).and_then(Value::as_i64)
    }

    /// 手动触发者用户ID
    pub fn triggered_by(&self) -> Option<i64> {
        self.data
            .get(payload_keys::TRIGGERED_BY)
            .and_then(Value::as_i64)
    }

    pub fn is_manual(&self) -> bool {
        self.data
            .get(payload_keys::MANUAL)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 是否还可以再次尝试
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// 入队请求
///
/// 未指定的字段由队列适配器补全默认值：优先级 0、最多尝试 3 次、名称取任务类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueTask {
    pub task_type: String,
    pub name: Option<String>,
    pub data: Value,
    pub priority: Option<i32>,
    pub max_attempts: Option<i32>,
}

impl NewQueueTask {
    pub fn new(task_type: impl Into<String>, data: Value) -> Self {
        Self {
            task_type: task_type.into(),
            name: None,
            data,
            priority: None,
            max_attempts: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// 补全默认值并生成等待中的队列任务
    pub fn into_queue_task(self, queue: &str, now: DateTime<Utc>) -> QueueTask {
        let name = self.name.unwrap_or_else(|| self.task_type.clone());
        QueueTask {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            task_type: self.task_type,
            name,
            data: self.data,
            priority: self.priority.unwrap_or(DEFAULT_PRIORITY),
            status: QueueTaskStatus::Pending,
            attempts: 0,
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
            error: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}

/// 任务列表查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub status: Option<QueueTaskStatus>,
}

impl TaskListQuery {
    pub const DEFAULT_LIMIT: u32 = 50;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// 单个队列的分页任务列表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTaskPage {
    pub queue: String,
    pub tasks: Vec<QueueTask>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl QueueTaskPage {
    pub fn new(queue: &str, tasks: Vec<QueueTask>, total: u64, page: Pagination) -> Self {
        let has_more = u64::from(page.offset) + (tasks.len() as u64) < total;
        Self {
            queue: queue.to_string(),
            tasks,
            total,
            limit: page.limit,
            offset: page.offset,
            has_more,
        }
    }

    pub fn empty(queue: &str, page: Pagination) -> Self {
        Self::new(queue, Vec::new(), 0, page)
    }
}

/// 截断错误信息，保证不超过给定字符数
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}
