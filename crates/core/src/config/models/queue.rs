use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::QueueDriver;
use crate::routing::QueueRouting;

/// Redis connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout_seconds: 10,
        }
    }
}

impl RedisConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.url.is_empty() {
            return Err(anyhow::anyhow!("Redis URL不能为空"));
        }

        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis URL必须以redis://或rediss://开头"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 队列配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 显式指定的驱动，为空时按 `QUEUE_DRIVER` 环境变量或运行档位决定
    pub driver: Option<QueueDriver>,
    /// Redis 键的命名空间前缀
    pub key_prefix: String,
    pub default_queue: String,
    /// 在列表中总是展示的队列
    pub known_queues: Vec<String>,
    /// 任务类型到队列的显式路由
    pub routes: HashMap<String, String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            driver: None,
            key_prefix: "taskq".to_string(),
            default_queue: "default".to_string(),
            known_queues: vec![
                "default".to_string(),
                "mail_queue".to_string(),
                "notification_queue".to_string(),
                "webhook_queue".to_string(),
                "system_queue".to_string(),
            ],
            routes: HashMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn routing(&self) -> QueueRouting {
        QueueRouting::new(self.routes.clone(), self.default_queue.clone())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_queue.trim().is_empty() {
            return Err(anyhow::anyhow!("默认队列名称不能为空"));
        }

        if self.key_prefix.trim().is_empty() || self.key_prefix.contains(':') {
            return Err(anyhow::anyhow!("键前缀不能为空且不能包含冒号"));
        }

        let is_valid_name = |name: &str| !name.trim().is_empty() && !name.contains(':');
        if let Some(bad) = self.known_queues.iter().find(|q| !is_valid_name(q)) {
            return Err(anyhow::anyhow!("无效的队列名称: '{}'", bad));
        }
        if let Some((task_type, queue)) = self.routes.iter().find(|(_, q)| !is_valid_name(q)) {
            return Err(anyhow::anyhow!(
                "任务类型 {} 的路由队列名称无效: '{}'",
                task_type,
                queue
            ));
        }

        Ok(())
    }
}
