use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::{HistoryStatus, Notification, QueueTask, TaskHistory};
use crate::SchedulerResult;

/// 一次终态执行的完整结果
///
/// 由任务存储在单个事务中落库：写入执行历史、更新任务定义、
/// 写入通知（手动触发时）并删除队列任务。
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task: QueueTask,
    pub status: HistoryStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub notification: Option<Notification>,
}

impl TaskOutcome {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0)
    }
}

/// Worker 使用的任务存储接口
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 读取一批可执行的等待任务，按优先级降序、创建时间升序
    async fn fetch_pending(&self, limit: u32) -> SchedulerResult<Vec<QueueTask>>;

    /// 仅当任务仍处于等待中时认领它，其他 Worker 抢先认领时返回 `None`
    async fn claim(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<Option<QueueTask>>;

    /// 执行失败但仍有剩余尝试次数，放回等待状态并记录错误
    async fn release_for_retry(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    /// 原子地写入终态结果，返回对应的执行历史
    async fn finish(&self, outcome: TaskOutcome) -> SchedulerResult<TaskHistory>;

    /// 将孤儿任务（处理中但无人执行）放回等待状态
    ///
    /// `stale_before` 为空时重置所有处理中的任务；否则只重置更新时间早于该时间点的任务。
    async fn reset_orphans(
        &self,
        stale_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<QueueTask>>;
}
