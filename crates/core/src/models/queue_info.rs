use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::SchedulerError;
use crate::queue_presentation::{describe_queue, QueueCategory};

/// 队列驱动
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueDriver {
    /// 数据库表实现的队列
    Database,
    /// Redis 有序集合实现的队列
    Redis,
}

impl QueueDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueDriver::Database => "database",
            QueueDriver::Redis => "redis",
        }
    }
}

impl fmt::Display for QueueDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueDriver {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" | "db" | "sqlite" => Ok(QueueDriver::Database),
            "redis" => Ok(QueueDriver::Redis),
            other => Err(SchedulerError::Configuration(format!(
                "不支持的队列驱动: {other}"
            ))),
        }
    }
}

/// 队列底层数据结构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStructure {
    Table,
    List,
    ZSet,
    Set,
    Stream,
}

impl QueueStructure {
    /// 只有有序集合与数据表支持按优先级/时间调度
    pub fn supports_scheduling(&self) -> bool {
        matches!(self, QueueStructure::ZSet | QueueStructure::Table)
    }
}

/// 队列统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue: String,
    /// 等待中的任务数
    pub depth: u64,
    /// 处理中的任务数
    pub running: u64,
    /// 失败任务数，数据库驱动下为已用尽尝试次数但尚未终结的任务
    pub failed: u64,
    pub paused: bool,
}

impl QueueStats {
    pub fn empty(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            ..Default::default()
        }
    }
}

/// 队列列表中的单项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub key: String,
    pub name: String,
    pub category: QueueCategory,
    pub color: String,
    /// 是否在配置中声明
    pub configured: bool,
    /// 是否为可识别的已知队列
    pub recognized: bool,
    pub driver: QueueDriver,
    pub structure: QueueStructure,
    pub supports_scheduling: bool,
    pub stats: QueueStats,
}

impl QueueInfo {
    /// 结合展示信息与统计构造队列项
    pub fn describe(
        key: &str,
        driver: QueueDriver,
        structure: QueueStructure,
        stats: QueueStats,
        configured: bool,
    ) -> Self {
        let presentation = describe_queue(key);
        Self {
            key: key.to_string(),
            name: presentation.name,
            category: presentation.category,
            color: presentation.color,
            configured,
            recognized: presentation.recognized,
            driver,
            structure,
            supports_scheduling: structure.supports_scheduling(),
            stats,
        }
    }
}

/// 队列列表选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQueuesOptions {
    /// 是否包含后端中发现但未在配置中声明的队列
    pub include_discovered: bool,
}

impl ListQueuesOptions {
    pub fn with_discovered() -> Self {
        Self {
            include_discovered: true,
        }
    }
}
