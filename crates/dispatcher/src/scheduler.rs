use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use taskq_core::config::SchedulerConfig;
use taskq_core::models::{payload_keys, NewQueueTask, QueueTask, TaskDefinition};
use taskq_core::routing::QueueRouting;
use taskq_core::{QueueAdapter, SchedulerError, SchedulerResult, TaskDefinitionRepository};
use taskq_infrastructure::{MetricsCollector, QueueEventBus, StructuredLogger};

use crate::next_run::compute_next_run;

/// 一轮调度的结果
#[derive(Debug, Default)]
pub struct SchedulePassReport {
    /// 本轮查询到的到期定义数
    pub due: usize,
    pub scheduled: Vec<QueueTask>,
    pub failed: usize,
}

/// 周期任务调度器
///
/// 每轮查找到期的任务定义，为每个定义入队一个队列任务并推进其下次执行时间。
pub struct TaskScheduler {
    definitions: Arc<dyn TaskDefinitionRepository>,
    queue: Arc<dyn QueueAdapter>,
    routing: QueueRouting,
    events: Arc<QueueEventBus>,
    metrics: Arc<MetricsCollector>,
    config: SchedulerConfig,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    pub fn new(
        definitions: Arc<dyn TaskDefinitionRepository>,
        queue: Arc<dyn QueueAdapter>,
        routing: QueueRouting,
        events: Arc<QueueEventBus>,
        metrics: Arc<MetricsCollector>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            definitions,
            queue,
            routing,
            events,
            metrics,
            config,
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 启动调度循环：立即执行一轮，之后按配置间隔执行。已在运行时不做任何事。
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("调度器已在运行");
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            scheduler.run_loop(rx).await;
        });
        *self.handle.lock().await = Some(handle);

        info!(
            "任务调度器已启动，间隔 {} 秒，每轮最多 {} 个定义",
            self.config.interval_seconds, self.config.batch_size
        );
    }

    /// 停止调度循环并等待正在执行的一轮结束，可重复调用
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("调度器循环异常退出: {}", e);
            }
        }
        info!("任务调度器已停止");
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let period = StdDuration::from_secs(self.config.interval_seconds.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_pass().await {
                        StructuredLogger::log_loop_error("scheduler", "run_pass", &e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("调度器循环收到关闭信号");
                    break;
                }
            }
        }
    }

    pub async fn run_pass(&self) -> SchedulerResult<SchedulePassReport> {
        self.run_pass_at(Utc::now()).await
    }

    /// 以给定时间执行一轮调度
    ///
    /// 单个定义入队失败只记录日志，不影响同一轮中的其他定义。
    #[instrument(skip(self))]
    pub async fn run_pass_at(&self, now: DateTime<Utc>) -> SchedulerResult<SchedulePassReport> {
        let started = Instant::now();
        let due = self
            .definitions
            .find_due(now, self.config.batch_size)
            .await?;

        let mut report = SchedulePassReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            debug!("没有到期的任务定义");
            return Ok(report);
        }

        let fallback = Duration::seconds(self.config.fallback_interval_seconds);
        let mut added: BTreeMap<String, Vec<QueueTask>> = BTreeMap::new();

        for definition in due {
            let task = match self.enqueue_definition(&definition, None).await {
                Ok(task) => task,
                Err(e) => {
                    error!(
                        "任务定义 {} ({}) 入队失败: {}",
                        definition.id, definition.name, e
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let next_run = compute_next_run(&definition, now, fallback);
            if let Err(e) = self
                .definitions
                .mark_queued(definition.id, now, next_run)
                .await
            {
                error!("更新任务定义 {} 的执行时间失败: {}", definition.id, e);
                report.failed += 1;
            }

            StructuredLogger::log_definition_scheduled(
                definition.id,
                &definition.name,
                &task.queue,
                next_run,
            );
            added.entry(task.queue.clone()).or_default().push(task.clone());
            report.scheduled.push(task);
        }

        for (queue, tasks) in &added {
            self.events.emit_tasks_added(queue, tasks).await;
        }

        let elapsed = started.elapsed();
        self.metrics
            .record_scheduler_pass(report.scheduled.len(), elapsed.as_secs_f64());
        StructuredLogger::log_scheduler_pass_complete(
            report.due,
            report.scheduled.len(),
            report.failed,
            elapsed.as_millis() as u64,
        );

        Ok(report)
    }

    /// 立即执行一个任务定义，不推进它的下次执行时间
    ///
    /// 负载中带上手动触发标记与触发者，Worker 在终态时通知该用户。
    #[instrument(skip(self))]
    pub async fn trigger_now(
        &self,
        definition_id: i64,
        triggered_by: Option<i64>,
    ) -> SchedulerResult<QueueTask> {
        let definition = self
            .definitions
            .get_by_id(definition_id)
            .await?
            .ok_or(SchedulerError::TaskDefinitionNotFound { id: definition_id })?;

        let task = self
            .enqueue_definition(&definition, Some(triggered_by))
            .await?;
        info!(
            "手动触发任务定义 {} ({})，队列任务 {}",
            definition.id, definition.name, task.id
        );

        self.events
            .emit_tasks_added(&task.queue, std::slice::from_ref(&task))
            .await;
        Ok(task)
    }

    async fn enqueue_definition(
        &self,
        definition: &TaskDefinition,
        manual: Option<Option<i64>>,
    ) -> SchedulerResult<QueueTask> {
        let queue = self.routing.resolve(&definition.task_type);
        let payload = build_payload(definition, manual);

        let request = NewQueueTask::new(definition.task_type.clone(), payload)
            .with_name(definition.name.clone())
            .with_priority(definition.priority)
            .with_max_attempts(definition.max_attempts);

        let task = self.queue.add_task(&queue, request).await?;
        self.metrics.record_task_enqueued(&queue);
        Ok(task)
    }
}

/// 构造队列任务负载
///
/// 任务定义ID必须放在负载内部：数据库队列只保存 `data` 字段，
/// Worker 依赖它回写执行结果。非对象数据包装为 `{"value": ...}`。
/// `manual` 为 `Some` 时表示手动触发，内层为触发者。
pub fn build_payload(definition: &TaskDefinition, manual: Option<Option<i64>>) -> Value {
    let mut data = match &definition.data {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };

    data.insert(
        payload_keys::TASK_DEFINITION_ID.to_string(),
        json!(definition.id),
    );

    let owner = definition
        .created_by
        .or_else(|| manual.flatten());
    if let Some(user_id) = owner {
        data.insert(payload_keys::CREATED_BY.to_string(), json!(user_id));
    }

    if let Some(triggered_by) = manual {
        data.insert(payload_keys::MANUAL.to_string(), json!(true));
        if let Some(user_id) = triggered_by {
            data.insert(payload_keys::TRIGGERED_BY.to_string(), json!(user_id));
        }
    }

    Value::Object(data)
}
