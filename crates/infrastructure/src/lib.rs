//! # taskq 基础设施
//!
//! 队列驱动（SQLite 与 Redis）、仓储实现、实时事件总线与可观测性工具。

pub mod database;
pub mod events;
pub mod observability;
pub mod queue_factory;
pub mod redis_queue;

pub use database::{
    connect_in_memory, create_pool, SqliteEmailOutbox, SqliteQueueAdapter,
    SqliteTaskDefinitionRepository, SqliteTaskHistoryRepository, SqliteTaskStore,
    SqliteUserDirectory,
};
pub use events::{EventEnvelope, EventTransport, QueueEventBus, QueueEventKind};
pub use observability::{mask_url, MetricsCollector, StructuredLogger};
pub use queue_factory::QueueAdapterFactory;
pub use redis_queue::{encode_member, queue_score, RedisConnectionManager, RedisQueueAdapter};
