//! 队列适配器接口
//!
//! 对上层（调度器、命令行、事件快照）屏蔽队列后端差异。数据库驱动与 Redis 驱动
//! 都实现同一个接口，由工厂按配置选择。
//!
//! ## 错误约定
//!
//! - `add_task` / `pop_task` / `delete_task` / `clear_queue` 返回错误，调用方决定如何处理
//! - 长度、列表与统计类方法属于尽力而为：后端出错时记录警告并返回空结果

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{
    ListQueuesOptions, NewQueueTask, Pagination, QueueDriver, QueueInfo, QueueStats, QueueTask,
    QueueTaskPage, TaskListQuery,
};
use crate::SchedulerResult;

/// 队列适配器抽象接口
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// 当前使用的驱动
    fn driver(&self) -> QueueDriver;

    /// 向指定队列添加任务，补全默认值后返回持久化的任务
    async fn add_task(&self, queue: &str, task: NewQueueTask) -> SchedulerResult<QueueTask>;

    /// 原子地认领队列中优先级最高、最早创建的等待任务
    ///
    /// 认领后任务状态变为处理中且尝试次数加一。`timeout` 只对支持阻塞读取的后端生效。
    async fn pop_task(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Option<QueueTask>>;

    /// 队列中等待中的任务数
    async fn get_queue_length(&self, queue: &str) -> u64;

    /// 跨队列列出任务
    async fn get_all_tasks(&self, query: TaskListQuery) -> Vec<QueueTask>;

    /// 按ID删除任务，返回是否确实删除
    async fn delete_task(&self, id: &str) -> SchedulerResult<bool>;

    /// 清空指定队列，`None` 表示清空所有队列，返回删除的任务数
    async fn clear_queue(&self, queue: Option<&str>) -> SchedulerResult<u64>;

    /// 列出队列及其统计信息
    async fn list_queues(&self, options: ListQueuesOptions) -> Vec<QueueInfo>;

    /// 分页读取单个队列的任务
    async fn get_queue_tasks(&self, queue: &str, page: Pagination) -> QueueTaskPage;

    async fn get_queue_stats(&self, queue: &str) -> QueueStats;
}
