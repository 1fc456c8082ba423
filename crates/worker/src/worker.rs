use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use taskq_core::config::WorkerConfig;
use taskq_core::models::{
    truncate_message, ExecutionContext, ExecutionIdentity, HistoryStatus, ListQueuesOptions,
    Notification, NotificationLevel, QueueTask, TaskHistory,
};
use taskq_core::{QueueAdapter, SchedulerResult, TaskOutcome, TaskStore, UserDirectory};
use taskq_infrastructure::{MetricsCollector, QueueEventBus, StructuredLogger};

use crate::registry::HandlerRegistry;

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// 任务已被其他 Worker 认领
    Skipped,
    Succeeded(TaskHistory),
    /// 执行失败，任务已放回等待状态
    Retrying { attempt: i32, error: String },
    Failed(TaskHistory),
}

impl ExecutionOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Succeeded(_) | ExecutionOutcome::Failed(_)
        )
    }
}

/// 一次孤儿任务恢复的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanRecoveryReport {
    /// 放回等待状态的任务数
    pub reset: usize,
    /// 已无剩余尝试次数、直接终结为失败的任务数
    pub abandoned: usize,
    /// 是否处于启动宽限期
    pub startup: bool,
}

/// Worker 构造器
pub struct TaskWorkerBuilder {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueAdapter>,
    registry: Arc<HandlerRegistry>,
    users: Option<Arc<dyn UserDirectory>>,
    events: Option<Arc<QueueEventBus>>,
    metrics: Option<Arc<MetricsCollector>>,
    config: WorkerConfig,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl TaskWorkerBuilder {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueAdapter>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            users: None,
            events: None,
            metrics: None,
            config: WorkerConfig::default(),
            worker_id: None,
            started_at: None,
        }
    }

    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn events(mut self, events: Arc<QueueEventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// 覆盖进程启动时间，孤儿恢复据此判断是否处于启动宽限期
    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn build(self) -> TaskWorker {
        let worker_id = self
            .worker_id
            .or_else(|| self.config.worker_id.clone())
            .unwrap_or_else(default_worker_id);

        TaskWorker {
            store: self.store,
            queue: self.queue,
            registry: self.registry,
            users: self.users,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(QueueEventBus::local_only(256))),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(MetricsCollector::new())),
            config: self.config,
            worker_id,
            started_at: self.started_at.unwrap_or_else(Utc::now),
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "worker".to_string());
    format!("{}-{}", host, std::process::id())
}

/// 任务 Worker
///
/// 周期性地从任务存储中取出一批等待任务并发执行，按剩余尝试次数决定重试或终结，
/// 同时负责恢复崩溃或重启后遗留在处理中状态的孤儿任务。
pub struct TaskWorker {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn QueueAdapter>,
    registry: Arc<HandlerRegistry>,
    users: Option<Arc<dyn UserDirectory>>,
    events: Arc<QueueEventBus>,
    metrics: Arc<MetricsCollector>,
    config: WorkerConfig,
    worker_id: String,
    started_at: DateTime<Utc>,
    running: AtomicBool,
    in_flight: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

/// 处理轮次标记，离开作用域时释放
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl TaskWorker {
    pub fn builder(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn QueueAdapter>,
        registry: Arc<HandlerRegistry>,
    ) -> TaskWorkerBuilder {
        TaskWorkerBuilder::new(store, queue, registry)
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 启动 Worker 循环
    ///
    /// 先恢复一次孤儿任务并立即处理一轮，之后每个轮询间隔依次执行处理与孤儿恢复。
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Worker {} 已在运行", self.worker_id);
            return;
        }

        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(tx);

        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move {
            worker.run_loop(rx).await;
        });
        *self.handle.lock().await = Some(handle);

        info!(
            "Worker {} 已启动，轮询间隔 {} 秒，每轮最多 {} 个任务",
            self.worker_id, self.config.poll_interval_seconds, self.config.batch_size
        );
    }

    /// 停止循环并等待正在进行的一轮结束，可重复调用
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown.lock().await.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Worker循环异常退出: {}", e);
            }
        }
        info!("Worker {} 已停止", self.worker_id);
    }

    async fn run_loop(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(e) = self.recover_orphans().await {
            StructuredLogger::log_loop_error("worker", "recover_orphans_on_startup", &e);
        }

        let period = StdDuration::from_secs(self.config.poll_interval_seconds.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.process_pass().await {
                        StructuredLogger::log_loop_error("worker", "process_pass", &e);
                    }
                    if let Err(e) = self.recover_orphans().await {
                        StructuredLogger::log_loop_error("worker", "recover_orphans", &e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Worker循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 执行一轮处理，返回实际执行的任务数
    ///
    /// 上一轮尚未结束时直接返回 0。同一轮中的任务并发执行，单个任务失败不影响其他任务。
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn process_pass(&self) -> SchedulerResult<usize> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("上一轮处理仍在进行，跳过本轮");
            return Ok(0);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let tasks = self.store.fetch_pending(self.config.batch_size).await?;
        if tasks.is_empty() {
            return Ok(0);
        }

        let results = join_all(tasks.into_iter().map(|task| async move {
            let task_id = task.id.clone();
            (task_id, self.execute_task(task).await)
        }))
        .await;

        let mut executed = 0;
        for (task_id, result) in results {
            match result {
                Ok(ExecutionOutcome::Skipped) => {}
                Ok(_) => executed += 1,
                Err(e) => {
                    error!("任务 {} 处理失败: {}", task_id, e);
                    executed += 1;
                }
            }
        }
        Ok(executed)
    }

    /// 认领并执行单个任务
    pub async fn execute_task(&self, task: QueueTask) -> SchedulerResult<ExecutionOutcome> {
        let started_at = Utc::now();
        let Some(task) = self.store.claim(&task.id, started_at).await? else {
            debug!("任务 {} 已被其他Worker认领", task.id);
            return Ok(ExecutionOutcome::Skipped);
        };

        self.events.emit_task_processing(&task, &self.worker_id).await;
        StructuredLogger::log_task_execution_start(
            &task.id,
            &task.task_type,
            &task.queue,
            task.attempts,
            task.max_attempts,
            &self.worker_id,
        );

        match self.run_handler(&task, started_at).await {
            Ok(result) => {
                let history = self
                    .finalize(&task, HistoryStatus::Success, started_at, Some(result), None)
                    .await?;
                Ok(ExecutionOutcome::Succeeded(history))
            }
            Err(e) => {
                let message = e.to_string();
                if task.has_attempts_left() {
                    let error = truncate_message(&message, self.config.retry_error_max_chars);
                    self.store
                        .release_for_retry(&task.id, &error, Utc::now())
                        .await?;
                    self.metrics
                        .record_task_retry(&task.task_type, task.attempts);
                    StructuredLogger::log_task_retry(
                        &task.id,
                        &task.task_type,
                        task.attempts,
                        task.max_attempts,
                        &error,
                    );
                    Ok(ExecutionOutcome::Retrying {
                        attempt: task.attempts,
                        error,
                    })
                } else {
                    let history = self
                        .finalize(&task, HistoryStatus::Error, started_at, None, Some(message))
                        .await?;
                    Ok(ExecutionOutcome::Failed(history))
                }
            }
        }
    }

    async fn run_handler(&self, task: &QueueTask, started_at: DateTime<Utc>) -> SchedulerResult<Value> {
        let handler = self.registry.get_handler(&task.task_type).await?;
        handler.validate(&task.data)?;

        let ctx = ExecutionContext {
            identity: self.resolve_identity(task).await,
            task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            queue: task.queue.clone(),
            attempt: task.attempts,
            max_attempts: task.max_attempts,
            definition_id: task.definition_id(),
            started_at,
        };
        debug!(
            "以 {} 身份执行任务 {}",
            ctx.identity.display_name(),
            task.id
        );

        handler.execute(&ctx, &task.data).await
    }

    /// 负载中的创建者存在时以该用户身份执行，否则以系统身份执行
    async fn resolve_identity(&self, task: &QueueTask) -> ExecutionIdentity {
        let (Some(user_id), Some(users)) = (task.created_by(), &self.users) else {
            return ExecutionIdentity::System;
        };

        match users.load_with_roles(user_id).await {
            Ok(Some(user)) => ExecutionIdentity::User(user),
            Ok(None) => {
                warn!("任务 {} 的创建者 {} 不存在，以系统身份执行", task.id, user_id);
                ExecutionIdentity::System
            }
            Err(e) => {
                warn!(
                    "加载任务 {} 的创建者 {} 失败，以系统身份执行: {}",
                    task.id, user_id, e
                );
                ExecutionIdentity::System
            }
        }
    }

    /// 写入终态结果并发出事件
    async fn finalize(
        &self,
        task: &QueueTask,
        status: HistoryStatus,
        started_at: DateTime<Utc>,
        result: Option<Value>,
        error: Option<String>,
    ) -> SchedulerResult<TaskHistory> {
        let notification = self.notification_for(task, status, error.as_deref());
        let outcome = TaskOutcome {
            task: task.clone(),
            status,
            started_at,
            finished_at: Utc::now(),
            result,
            error: error
                .as_deref()
                .map(|e| truncate_message(e, self.config.history_error_max_chars)),
            notification,
        };
        let duration_ms = outcome.duration_ms();

        let history = self.store.finish(outcome).await?;

        self.metrics.record_task_execution(
            &task.task_type,
            status.as_str(),
            duration_ms as f64 / 1000.0,
        );
        if status == HistoryStatus::Error {
            self.metrics.record_task_failure(&task.task_type);
        }
        StructuredLogger::log_task_execution_complete(
            &task.id,
            &task.task_type,
            &self.worker_id,
            status == HistoryStatus::Success,
            duration_ms,
            history.error.as_deref(),
        );

        match status {
            HistoryStatus::Success => self.events.emit_task_completed(task, &history).await,
            HistoryStatus::Error => self.events.emit_task_error(task, &history).await,
        }
        self.events.emit_task_history_update(&history).await;

        let queues = self.queue.list_queues(ListQueuesOptions::default()).await;
        for info in &queues {
            self.metrics.update_queue_depth(&info.key, info.stats.depth);
        }
        self.events.emit_queue_update(&queues).await;

        Ok(history)
    }

    /// 手动触发的任务在终态时通知触发者
    fn notification_for(
        &self,
        task: &QueueTask,
        status: HistoryStatus,
        error: Option<&str>,
    ) -> Option<Notification> {
        if !task.is_manual() {
            return None;
        }
        let user_id = task.triggered_by()?;

        let notification = match status {
            HistoryStatus::Success => Notification {
                user_id,
                title: "任务执行成功".to_string(),
                message: format!("任务 {} 已执行完成", task.name),
                level: NotificationLevel::Success,
            },
            HistoryStatus::Error => Notification {
                user_id,
                title: "任务执行失败".to_string(),
                message: truncate_message(
                    &format!("任务 {} 执行失败: {}", task.name, error.unwrap_or("未知错误")),
                    self.config.notification_error_max_chars,
                ),
                level: NotificationLevel::Error,
            },
        };
        Some(notification)
    }

    pub async fn recover_orphans(&self) -> SchedulerResult<OrphanRecoveryReport> {
        self.recover_orphans_at(Utc::now()).await
    }

    /// 以给定时间恢复孤儿任务
    ///
    /// 启动宽限期内重置所有处理中的任务；之后只重置超过孤儿超时未更新的任务。
    /// 已用尽尝试次数的任务直接终结为失败。
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn recover_orphans_at(
        &self,
        now: DateTime<Utc>,
    ) -> SchedulerResult<OrphanRecoveryReport> {
        let startup = now - self.started_at < Duration::seconds(self.config.startup_grace_seconds);
        let stale_before = if startup {
            None
        } else {
            Some(now - Duration::seconds(self.config.orphan_timeout_seconds))
        };

        let orphans = self.store.reset_orphans(stale_before, now).await?;
        let mut report = OrphanRecoveryReport {
            startup,
            ..Default::default()
        };
        if orphans.is_empty() {
            return Ok(report);
        }

        for task in orphans {
            if task.has_attempts_left() {
                report.reset += 1;
                continue;
            }

            let started_at = task.processed_at.unwrap_or(now);
            let error = format!(
                "任务在执行中断后已用尽 {} 次尝试",
                task.max_attempts
            );
            match self
                .finalize(&task, HistoryStatus::Error, started_at, None, Some(error))
                .await
            {
                Ok(_) => report.abandoned += 1,
                Err(e) => {
                    error!("终结孤儿任务 {} 失败: {}", task.id, e);
                    report.reset += 1;
                }
            }
        }

        self.metrics
            .record_orphans_recovered(report.reset + report.abandoned);
        StructuredLogger::log_orphans_recovered(
            &self.worker_id,
            report.reset,
            report.abandoned,
            report.startup,
        );
        Ok(report)
    }
}
