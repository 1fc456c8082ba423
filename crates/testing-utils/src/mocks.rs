//! 测试替身
//!
//! 内存实现的处理器、队列适配器与用户目录，不依赖数据库或外部服务。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use taskq_core::models::{
    ExecutionContext, ListQueuesOptions, NewQueueTask, Pagination, QueueDriver, QueueInfo,
    QueueStats, QueueStructure, QueueTask, QueueTaskPage, QueueTaskStatus, TaskKind,
    TaskListQuery, UserIdentity,
};
use taskq_core::{
    FieldType, QueueAdapter, SchemaField, SchedulerError, SchedulerResult, TaskHandler,
    TaskSchema, UserDirectory,
};

/// Mock 处理器的执行行为
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Succeed(Value),
    Fail(String),
    /// 前 N 次失败，之后成功
    FailTimes(usize, Value),
}

/// 可配置行为的任务处理器，记录每次执行的上下文
pub struct MockTaskHandler {
    kind: TaskKind,
    behavior: MockBehavior,
    calls: AtomicUsize,
    contexts: Mutex<Vec<ExecutionContext>>,
    delay: Option<Duration>,
}

impl MockTaskHandler {
    pub fn new(kind: TaskKind, behavior: MockBehavior) -> Self {
        Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn succeeding(kind: TaskKind) -> Self {
        Self::new(kind, MockBehavior::Succeed(json!({"ok": true})))
    }

    pub fn failing(kind: TaskKind, message: &str) -> Self {
        Self::new(kind, MockBehavior::Fail(message.to_string()))
    }

    pub fn failing_times(kind: TaskKind, times: usize) -> Self {
        Self::new(kind, MockBehavior::FailTimes(times, json!({"ok": true})))
    }

    /// 每次执行前先等待一段时间
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn contexts(&self) -> Vec<ExecutionContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for MockTaskHandler {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn schema(&self) -> TaskSchema {
        TaskSchema::new(
            self.kind,
            vec![SchemaField::optional("value", FieldType::Any, "测试数据")],
        )
    }

    async fn execute(&self, ctx: &ExecutionContext, _data: &Value) -> SchedulerResult<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.contexts.lock().unwrap().push(ctx.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::Succeed(result) => Ok(result.clone()),
            MockBehavior::Fail(message) => Err(SchedulerError::TaskExecution(message.clone())),
            MockBehavior::FailTimes(times, result) => {
                if call <= *times {
                    Err(SchedulerError::TaskExecution(format!("第{call}次执行失败")))
                } else {
                    Ok(result.clone())
                }
            }
        }
    }
}

/// 内存队列适配器
///
/// 可以指定一组任务类型，对这些类型的入队请求返回错误。
#[derive(Clone, Default)]
pub struct MockQueueAdapter {
    tasks: Arc<Mutex<Vec<QueueTask>>>,
    failing_types: Arc<Mutex<HashSet<String>>>,
}

impl MockQueueAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 该类型的入队请求将失败
    pub fn fail_enqueue_for(&self, task_type: &str) {
        self.failing_types
            .lock()
            .unwrap()
            .insert(task_type.to_string());
    }

    pub fn tasks(&self) -> Vec<QueueTask> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn tasks_in(&self, queue: &str) -> Vec<QueueTask> {
        self.tasks()
            .into_iter()
            .filter(|t| t.queue == queue)
            .collect()
    }

    fn stats_for(&self, queue: &str) -> QueueStats {
        let tasks = self.tasks.lock().unwrap();
        let mut stats = QueueStats::empty(queue);
        for task in tasks.iter().filter(|t| t.queue == queue) {
            match task.status {
                QueueTaskStatus::Pending if task.has_attempts_left() => stats.depth += 1,
                QueueTaskStatus::Pending => {
                    stats.depth += 1;
                    stats.failed += 1;
                }
                QueueTaskStatus::Processing => stats.running += 1,
            }
        }
        stats
    }
}

#[async_trait]
impl QueueAdapter for MockQueueAdapter {
    fn driver(&self) -> QueueDriver {
        QueueDriver::Database
    }

    async fn add_task(&self, queue: &str, task: NewQueueTask) -> SchedulerResult<QueueTask> {
        if self.failing_types.lock().unwrap().contains(&task.task_type) {
            return Err(SchedulerError::MessageQueue(format!(
                "模拟入队失败: {}",
                task.task_type
            )));
        }
        let task = task.into_queue_task(queue, Utc::now());
        self.tasks.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn pop_task(
        &self,
        queue: &str,
        _timeout: Option<Duration>,
    ) -> SchedulerResult<Option<QueueTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        let best = tasks
            .iter_mut()
            .filter(|t| {
                t.queue == queue && t.status == QueueTaskStatus::Pending && t.has_attempts_left()
            })
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
            });

        Ok(best.map(|task| {
            task.status = QueueTaskStatus::Processing;
            task.attempts += 1;
            task.updated_at = Utc::now();
            task.processed_at = Some(task.updated_at);
            task.clone()
        }))
    }

    async fn get_queue_length(&self, queue: &str) -> u64 {
        self.stats_for(queue).depth
    }

    async fn get_all_tasks(&self, query: TaskListQuery) -> Vec<QueueTask> {
        self.tasks()
            .into_iter()
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect()
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        Ok(tasks.len() < before)
    }

    async fn clear_queue(&self, queue: Option<&str>) -> SchedulerResult<u64> {
        let mut tasks = self.tasks.lock().unwrap();
        let before = tasks.len();
        match queue {
            Some(queue) => tasks.retain(|t| t.queue != queue),
            None => tasks.clear(),
        }
        Ok((before - tasks.len()) as u64)
    }

    async fn list_queues(&self, _options: ListQueuesOptions) -> Vec<QueueInfo> {
        let mut names: Vec<String> = self.tasks().into_iter().map(|t| t.queue).collect();
        names.sort();
        names.dedup();
        names
            .iter()
            .map(|name| {
                QueueInfo::describe(
                    name,
                    QueueDriver::Database,
                    QueueStructure::Table,
                    self.stats_for(name),
                    true,
                )
            })
            .collect()
    }

    async fn get_queue_tasks(&self, queue: &str, page: Pagination) -> QueueTaskPage {
        let all = self.tasks_in(queue);
        let total = all.len() as u64;
        let tasks = all
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        QueueTaskPage::new(queue, tasks, total, page)
    }

    async fn get_queue_stats(&self, queue: &str) -> QueueStats {
        self.stats_for(queue)
    }
}

/// 内存用户目录
#[derive(Default)]
pub struct MockUserDirectory {
    users: Mutex<HashMap<i64, UserIdentity>>,
}

impl MockUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: i64, username: &str, roles: &[&str]) -> Self {
        self.users.lock().unwrap().insert(
            id,
            UserIdentity {
                id,
                username: username.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn load_with_roles(&self, user_id: i64) -> SchedulerResult<Option<UserIdentity>> {
        Ok(self.users.lock().unwrap().get(&user_id).cloned())
    }
}
