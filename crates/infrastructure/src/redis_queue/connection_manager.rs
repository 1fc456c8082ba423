use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use taskq_core::config::RedisConfig;
use taskq_core::{SchedulerError, SchedulerResult};

use crate::observability::StructuredLogger;

/// 把 Redis 错误转换为消息队列错误
pub fn redis_error(operation: &str, err: redis::RedisError) -> SchedulerError {
    SchedulerError::MessageQueue(format!("Redis {operation} failed: {err}"))
}

/// 自动重连的 Redis 连接
#[derive(Clone)]
pub struct RedisConnectionManager {
    manager: ConnectionManager,
}

impl RedisConnectionManager {
    pub async fn new(config: &RedisConfig) -> SchedulerResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            SchedulerError::MessageQueue(format!("Failed to create Redis client: {e}"))
        })?;

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| {
                SchedulerError::MessageQueue(format!(
                    "Timed out connecting to Redis after {}s",
                    config.connection_timeout_seconds
                ))
            })?
            .map_err(|e| redis_error("connect", e))?;

        let connection = Self { manager };
        connection.ping().await?;
        StructuredLogger::log_backend_connected("redis", &config.url);
        Ok(connection)
    }

    /// 取得一个可在当前调用中使用的连接句柄
    pub fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.connection();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| redis_error("PING", e))?;
        Ok(())
    }
}
