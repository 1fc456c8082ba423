use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// 每轮最多处理的到期定义数
    pub batch_size: u32,
    /// cron 表达式无效时的回退间隔
    pub fallback_interval_seconds: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 30,
            batch_size: 50,
            fallback_interval_seconds: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_seconds == 0 {
            return Err(anyhow::anyhow!("调度间隔必须大于0"));
        }

        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("调度批量大小必须大于0"));
        }

        if self.fallback_interval_seconds <= 0 {
            return Err(anyhow::anyhow!("回退间隔必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 为空时使用 主机名-进程号
    pub worker_id: Option<String>,
    /// 每轮处理的最大任务数
    pub batch_size: u32,
    pub poll_interval_seconds: u64,
    /// 启动宽限期内，所有处理中的任务都视为孤儿
    pub startup_grace_seconds: i64,
    /// 宽限期后，处理中且超过该时长未更新的任务视为孤儿
    pub orphan_timeout_seconds: i64,
    pub retry_error_max_chars: usize,
    pub history_error_max_chars: usize,
    pub notification_error_max_chars: usize,
    /// 历史清理任务未指定时的保留天数
    pub history_retention_days: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: None,
            batch_size: 3,
            poll_interval_seconds: 10,
            startup_grace_seconds: 30,
            orphan_timeout_seconds: 120,
            retry_error_max_chars: 1000,
            history_error_max_chars: 10000,
            notification_error_max_chars: 200,
            history_retention_days: 30,
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            return Err(anyhow::anyhow!("Worker批量大小必须大于0"));
        }

        if self.poll_interval_seconds == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }

        if self.startup_grace_seconds < 0 || self.orphan_timeout_seconds <= 0 {
            return Err(anyhow::anyhow!("孤儿任务时间阈值无效"));
        }

        if self.history_retention_days <= 0 {
            return Err(anyhow::anyhow!("历史保留天数必须大于0"));
        }

        if let Some(id) = &self.worker_id {
            if id.trim().is_empty() {
                return Err(anyhow::anyhow!("Worker ID不能为空"));
            }
        }

        Ok(())
    }
}
