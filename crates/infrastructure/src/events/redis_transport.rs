use async_trait::async_trait;
use taskq_core::SchedulerResult;

use super::EventTransport;
use crate::redis_queue::{redis_error, RedisConnectionManager};

/// 通过 Redis `PUBLISH` 发布事件
pub struct RedisEventTransport {
    connection: RedisConnectionManager,
}

impl RedisEventTransport {
    pub fn new(connection: RedisConnectionManager) -> Self {
        Self { connection }
    }
}

#[async_trait]
impl EventTransport for RedisEventTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()> {
        let mut conn = self.connection.connection();
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("PUBLISH", e))?;
        Ok(())
    }
}
