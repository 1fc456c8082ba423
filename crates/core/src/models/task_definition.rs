use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SchedulerError;

/// 任务定义最近一次运行的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionRunStatus {
    /// 已入队，等待执行
    Queued,
    Success,
    Error,
}

impl DefinitionRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionRunStatus::Queued => "queued",
            DefinitionRunStatus::Success => "success",
            DefinitionRunStatus::Error => "error",
        }
    }
}

impl fmt::Display for DefinitionRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DefinitionRunStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DefinitionRunStatus::Queued),
            "success" => Ok(DefinitionRunStatus::Success),
            "error" => Ok(DefinitionRunStatus::Error),
            other => Err(SchedulerError::Serialization(format!(
                "未知的任务定义运行状态: {other}"
            ))),
        }
    }
}

/// 任务定义
///
/// 周期性任务的持久化配置。调度器按 `next_run` 发现到期的定义，
/// 将其作为队列任务入队，并根据 `period_seconds` 或 `cron_expr` 推进下一次运行时间。
///
/// # 字段说明
///
/// - `period_seconds`: 固定间隔（秒），优先于 cron 表达式
/// - `cron_expr`: cron 表达式，支持5段（分 时 日 月 周）或6/7段格式
/// - `next_run`: 为空表示立即到期
/// - `run_count`: 终态执行次数，成功与失败都会累加
/// 固定间隔上限，约100年
pub const MAX_PERIOD_SECONDS: i64 = 100 * 366 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: i64,
    pub name: String,
    pub task_type: String,
    pub data: Value,
    pub is_active: bool,
    pub period_seconds: Option<i64>,
    pub cron_expr: Option<String>,
    pub priority: i32,
    pub max_attempts: i32,
    pub created_by: Option<i64>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub last_status: Option<DefinitionRunStatus>,
    pub last_error: Option<String>,
    pub run_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskDefinition {
    /// 在给定时间点是否到期
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run.map(|next| next <= now).unwrap_or(true)
    }
}

/// 创建任务定义的请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskDefinition {
    pub name: String,
    pub task_type: String,
    pub data: Value,
    pub is_active: bool,
    pub period_seconds: Option<i64>,
    pub cron_expr: Option<String>,
    pub priority: i32,
    pub max_attempts: i32,
    pub created_by: Option<i64>,
    pub next_run: Option<DateTime<Utc>>,
}

impl NewTaskDefinition {
    pub fn new(name: impl Into<String>, task_type: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            task_type: task_type.into(),
            data,
            is_active: true,
            period_seconds: None,
            cron_expr: None,
            priority: super::DEFAULT_PRIORITY,
            max_attempts: super::DEFAULT_MAX_ATTEMPTS,
            created_by: None,
            next_run: None,
        }
    }

    pub fn every(mut self, seconds: i64) -> Self {
        self.period_seconds = Some(seconds);
        self
    }

    pub fn cron(mut self, expr: impl Into<String>) -> Self {
        self.cron_expr = Some(expr.into());
        self
    }

    pub fn created_by(mut self, user_id: i64) -> Self {
        self.created_by = Some(user_id);
        self
    }

    pub fn next_run(mut self, at: DateTime<Utc>) -> Self {
        self.next_run = Some(at);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
