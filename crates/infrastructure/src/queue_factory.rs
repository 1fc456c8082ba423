use std::sync::Arc;

use sqlx::SqlitePool;
use taskq_core::config::AppConfig;
use taskq_core::models::QueueDriver;
use taskq_core::{QueueAdapter, SchedulerError, SchedulerResult};
use tracing::{debug, info, warn};

use crate::database::SqliteQueueAdapter;
use crate::events::{EventTransport, QueueEventBus, RedisEventTransport};
use crate::observability::MetricsCollector;
use crate::redis_queue::{RedisConnectionManager, RedisQueueAdapter};

/// 按配置创建队列适配器与事件总线
pub struct QueueAdapterFactory;

impl QueueAdapterFactory {
    pub async fn create(config: &AppConfig, pool: SqlitePool) -> SchedulerResult<Arc<dyn QueueAdapter>> {
        let driver = config
            .resolve_driver()
            .map_err(|e| SchedulerError::Configuration(format!("{e:#}")))?;
        debug!("Creating queue adapter with driver: {}", driver);

        match driver {
            QueueDriver::Database => {
                info!("Initializing database queue adapter");
                Ok(Arc::new(SqliteQueueAdapter::new(
                    pool,
                    config.queue.known_queues.clone(),
                )))
            }
            QueueDriver::Redis => {
                let redis_config = config.redis.as_ref().ok_or_else(|| {
                    SchedulerError::Configuration("队列驱动为redis，但未配置[redis]".to_string())
                })?;
                info!("Initializing Redis queue adapter");
                let connection = RedisConnectionManager::new(redis_config).await?;
                Ok(Arc::new(RedisQueueAdapter::new(
                    connection,
                    config.queue.key_prefix.clone(),
                    config.queue.known_queues.clone(),
                )))
            }
        }
    }

    /// 创建事件总线；Redis 不可用时只使用进程内广播
    pub async fn create_event_bus(
        config: &AppConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<QueueEventBus> {
        let mut transport: Option<Arc<dyn EventTransport>> = None;

        if config.events.publish_to_redis {
            if let Some(redis_config) = &config.redis {
                match RedisConnectionManager::new(redis_config).await {
                    Ok(connection) => {
                        transport = Some(Arc::new(RedisEventTransport::new(connection)));
                    }
                    Err(e) => warn!("Redis unavailable for events, using local broadcast: {}", e),
                }
            }
        }

        Arc::new(
            QueueEventBus::new(
                config.events.channel.clone(),
                config.events.local_capacity,
                transport,
            )
            .with_metrics(metrics),
        )
    }
}
