//! 集成测试环境
//!
//! `TestDatabase` 提供迁移完成的内存 SQLite 及全部仓储实现；
//! `RedisTestContainer` 启动一个 Redis 容器，需要 Docker。

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;
use taskq_core::config::RedisConfig;
use taskq_infrastructure::{
    connect_in_memory, RedisConnectionManager, RedisQueueAdapter, SqliteEmailOutbox,
    SqliteQueueAdapter, SqliteTaskDefinitionRepository, SqliteTaskHistoryRepository,
    SqliteTaskStore, SqliteUserDirectory,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::redis::Redis;

/// 测试使用的已配置队列
pub const TEST_KNOWN_QUEUES: &[&str] = &[
    "default",
    "mail_queue",
    "notification_queue",
    "webhook_queue",
    "system_queue",
];

/// 内存 SQLite 测试数据库
pub struct TestDatabase {
    pub pool: SqlitePool,
    pub queue: Arc<SqliteQueueAdapter>,
    pub store: Arc<SqliteTaskStore>,
    pub definitions: Arc<SqliteTaskDefinitionRepository>,
    pub histories: Arc<SqliteTaskHistoryRepository>,
    pub users: Arc<SqliteUserDirectory>,
    pub outbox: Arc<SqliteEmailOutbox>,
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        let pool = connect_in_memory().await?;
        let known_queues = TEST_KNOWN_QUEUES.iter().map(|q| q.to_string()).collect();

        Ok(Self {
            queue: Arc::new(SqliteQueueAdapter::new(pool.clone(), known_queues)),
            store: Arc::new(SqliteTaskStore::new(pool.clone())),
            definitions: Arc::new(SqliteTaskDefinitionRepository::new(pool.clone())),
            histories: Arc::new(SqliteTaskHistoryRepository::new(pool.clone())),
            users: Arc::new(SqliteUserDirectory::new(pool.clone())),
            outbox: Arc::new(SqliteEmailOutbox::new(pool.clone())),
            pool,
        })
    }

    /// 统计表中的行数
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// 直接修改队列任务的更新时间，用于构造孤儿任务场景
    pub async fn set_task_updated_at(
        &self,
        task_id: &str,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE queue_tasks SET updated_at = ? WHERE id = ?")
            .bind(at.timestamp_millis())
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Redis 测试容器
pub struct RedisTestContainer {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    pub config: RedisConfig,
    pub connection: RedisConnectionManager,
}

impl RedisTestContainer {
    pub async fn new() -> Result<Self> {
        let container = Redis::default().start().await?;
        let port = container.get_host_port_ipv4(6379).await?;

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{port}"),
            ..Default::default()
        };
        let connection = RedisConnectionManager::new(&config).await?;

        Ok(Self {
            container,
            config,
            connection,
        })
    }

    pub fn queue_adapter(&self, key_prefix: &str) -> RedisQueueAdapter {
        RedisQueueAdapter::new(
            self.connection.clone(),
            key_prefix,
            TEST_KNOWN_QUEUES.iter().map(|q| q.to_string()).collect(),
        )
    }
}
