//! 数据仓储层接口定义
//!
//! - `TaskDefinitionRepository` - 周期任务定义的读写与调度推进
//! - `TaskHistoryRepository` - 执行历史查询与清理
//! - `UserDirectory` - 执行身份所需的用户与角色查询
//! - `EmailOutbox` - 邮件通知处理器的发件箱

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NewTaskDefinition, OutgoingEmail, TaskDefinition, TaskHistory, UserIdentity};
use crate::SchedulerResult;

/// 任务定义仓储
#[async_trait]
pub trait TaskDefinitionRepository: Send + Sync {
    async fn create(&self, definition: NewTaskDefinition) -> SchedulerResult<TaskDefinition>;

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskDefinition>>;

    async fn list(&self) -> SchedulerResult<Vec<TaskDefinition>>;

    /// 查找到期的活跃定义：`next_run` 为空或不晚于 `now`，按 `next_run` 升序
    async fn find_due(&self, now: DateTime<Utc>, limit: u32)
        -> SchedulerResult<Vec<TaskDefinition>>;

    /// 记录一次入队：更新 `last_run`、`next_run` 并将最近状态置为已入队
    async fn mark_queued(
        &self,
        id: i64,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    async fn set_active(&self, id: i64, active: bool) -> SchedulerResult<()>;

    async fn delete(&self, id: i64) -> SchedulerResult<bool>;
}

/// 执行历史仓储
#[async_trait]
pub trait TaskHistoryRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskHistory>>;

    async fn list_recent(&self, limit: u32) -> SchedulerResult<Vec<TaskHistory>>;

    async fn list_for_definition(
        &self,
        task_id: i64,
        limit: u32,
    ) -> SchedulerResult<Vec<TaskHistory>>;

    /// 删除完成时间早于 `cutoff` 的记录，返回删除条数
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64>;
}

/// 用户目录
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 加载用户及其角色，用户不存在或已停用时返回 `None`
    async fn load_with_roles(&self, user_id: i64) -> SchedulerResult<Option<UserIdentity>>;
}

/// 邮件发件箱
#[async_trait]
pub trait EmailOutbox: Send + Sync {
    /// 写入一封待发送邮件，返回发件箱记录ID
    async fn stage(&self, email: OutgoingEmail) -> SchedulerResult<i64>;
}
