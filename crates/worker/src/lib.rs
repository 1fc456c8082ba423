//! # taskq Worker
//!
//! 处理器注册表、内置处理器以及执行队列任务的 Worker。
//!
//! Worker 每轮从任务存储取出一批等待任务并发执行：成功时原子地写入执行历史并删除任务，
//! 失败时按剩余尝试次数放回队列或终结为失败；同时按两级策略恢复孤儿任务。

pub mod handlers;
pub mod registry;
pub mod worker;

pub use handlers::{
    register_builtin_handlers, EmailNotificationHandler, HistoryCleanupHandler, WebhookHandler,
    WebhookParams,
};
pub use registry::HandlerRegistry;
pub use worker::{ExecutionOutcome, OrphanRecoveryReport, TaskWorker, TaskWorkerBuilder};
