use std::sync::Arc;

use anyhow::{Context, Result};
use taskq_core::config::AppConfig;
use taskq_core::models::QueueDriver;
use taskq_core::QueueAdapter;
use taskq_dispatcher::TaskScheduler;
use taskq_infrastructure::{
    create_pool, mask_url, MetricsCollector, QueueAdapterFactory, QueueEventBus, SqliteEmailOutbox,
    SqliteTaskDefinitionRepository, SqliteTaskHistoryRepository, SqliteTaskStore,
    SqliteUserDirectory,
};
use taskq_worker::{register_builtin_handlers, HandlerRegistry, TaskWorker};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度器
    Scheduler,
    /// 仅运行Worker
    Worker,
    /// 运行所有组件
    All,
}

impl AppMode {
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "scheduler" => Ok(AppMode::Scheduler),
            "worker" => Ok(AppMode::Worker),
            "all" => Ok(AppMode::All),
            other => Err(anyhow::anyhow!("不支持的运行模式: {other}")),
        }
    }

    fn runs_scheduler(&self) -> bool {
        matches!(self, AppMode::Scheduler | AppMode::All)
    }

    fn runs_worker(&self) -> bool {
        matches!(self, AppMode::Worker | AppMode::All)
    }
}

/// 主应用程序
///
/// 按配置组装队列适配器、事件总线、调度器与 Worker。
/// 处理器注册失败属于配置错误，在 `new` 中直接返回。
pub struct Application {
    mode: AppMode,
    driver: QueueDriver,
    queue: Arc<dyn QueueAdapter>,
    events: Arc<QueueEventBus>,
    registry: Arc<HandlerRegistry>,
    scheduler: Option<Arc<TaskScheduler>>,
    worker: Option<Arc<TaskWorker>>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}，档位: {:?}", mode, config.profile);

        let driver = config.resolve_driver().context("解析队列驱动失败")?;
        info!("数据库: {}", mask_url(&config.database.url));
        if let Some(redis) = &config.redis {
            info!("Redis: {}", mask_url(&redis.url));
        }
        let pool = create_pool(&config.database)
            .await
            .context("初始化数据库失败")?;

        let metrics = Arc::new(MetricsCollector::new());
        let queue = QueueAdapterFactory::create(&config, pool.clone())
            .await
            .context("创建队列适配器失败")?;
        let events = QueueAdapterFactory::create_event_bus(&config, Arc::clone(&metrics)).await;

        let scheduler = if mode.runs_scheduler() && config.scheduler.enabled {
            Some(Arc::new(TaskScheduler::new(
                Arc::new(SqliteTaskDefinitionRepository::new(pool.clone())),
                Arc::clone(&queue),
                config.queue.routing(),
                Arc::clone(&events),
                Arc::clone(&metrics),
                config.scheduler.clone(),
            )))
        } else {
            None
        };

        let registry = Arc::new(HandlerRegistry::new());
        let worker = if !mode.runs_worker() || !config.worker.enabled {
            None
        } else if driver != QueueDriver::Database {
            info!("队列驱动为 {}，任务由外部消费者执行，不启动内置Worker", driver);
            None
        } else {
            register_builtin_handlers(
                &registry,
                Arc::new(SqliteEmailOutbox::new(pool.clone())),
                Arc::new(SqliteTaskHistoryRepository::new(pool.clone())),
                config.worker.history_retention_days,
            )
            .await
            .context("注册任务处理器失败")?;
            registry
                .initialize()
                .await
                .context("初始化处理器注册表失败")?;

            let worker = TaskWorker::builder(
                Arc::new(SqliteTaskStore::new(pool.clone())),
                Arc::clone(&queue),
                Arc::clone(&registry),
            )
            .users(Arc::new(SqliteUserDirectory::new(pool.clone())))
            .events(Arc::clone(&events))
            .metrics(Arc::clone(&metrics))
            .config(config.worker.clone())
            .build();
            Some(Arc::new(worker))
        };

        Ok(Self {
            mode,
            driver,
            queue,
            events,
            registry,
            scheduler,
            worker,
        })
    }

    pub fn driver(&self) -> QueueDriver {
        self.driver
    }

    pub fn queue(&self) -> Arc<dyn QueueAdapter> {
        Arc::clone(&self.queue)
    }

    pub fn events(&self) -> Arc<QueueEventBus> {
        Arc::clone(&self.events)
    }

    pub fn scheduler(&self) -> Option<Arc<TaskScheduler>> {
        self.scheduler.clone()
    }

    pub fn worker(&self) -> Option<Arc<TaskWorker>> {
        self.worker.clone()
    }

    /// 启动已启用的组件，收到关闭信号后依次停止
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        if let Some(scheduler) = &self.scheduler {
            scheduler.start().await;
        }
        if let Some(worker) = &self.worker {
            worker.start().await;
        }
        if self.scheduler.is_none() && self.worker.is_none() {
            warn!("没有启用任何组件，等待关闭信号");
        }

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
        }
        if let Some(worker) = &self.worker {
            worker.stop().await;
        }
        self.registry.cleanup_all().await;

        info!("所有组件已停止");
        Ok(())
    }
}
