use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchedulerError;

/// 执行历史的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Error,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Success => "success",
            HistoryStatus::Error => "error",
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(HistoryStatus::Success),
            "error" => Ok(HistoryStatus::Error),
            other => Err(SchedulerError::Serialization(format!(
                "未知的执行历史状态: {other}"
            ))),
        }
    }
}

impl From<HistoryStatus> for super::DefinitionRunStatus {
    fn from(status: HistoryStatus) -> Self {
        match status {
            HistoryStatus::Success => super::DefinitionRunStatus::Success,
            HistoryStatus::Error => super::DefinitionRunStatus::Error,
        }
    }
}

/// 任务执行历史
///
/// 每个队列任务在终态时恰好对应一条历史记录（重试不会产生中间记录）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskHistory {
    pub id: i64,
    /// 来源任务定义ID（临时任务为空）
    pub task_id: Option<i64>,
    pub queue_task_id: String,
    pub task_type: String,
    pub task_name: String,
    pub queue_name: String,
    pub status: HistoryStatus,
    pub attempts: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub result: Option<Value>,
    pub error: Option<String>,
}
