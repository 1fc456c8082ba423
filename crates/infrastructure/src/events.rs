//! 实时队列事件
//!
//! 事件优先通过 Redis 发布到配置的频道；未配置 Redis 或发布失败时，
//! 退回到进程内的广播通道。发射事件永远不会向调用方返回错误。

pub mod envelope;
pub mod redis_transport;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use taskq_core::models::{QueueInfo, QueueTask, TaskHistory};
use taskq_core::SchedulerResult;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use envelope::{EventEnvelope, QueueEventKind};
pub use redis_transport::RedisEventTransport;

use crate::observability::MetricsCollector;

/// 事件发布通道
#[async_trait]
pub trait EventTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()>;
}

/// 队列事件总线
pub struct QueueEventBus {
    transport: Option<Arc<dyn EventTransport>>,
    channel: String,
    local: broadcast::Sender<EventEnvelope>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl QueueEventBus {
    pub fn new(
        channel: impl Into<String>,
        capacity: usize,
        transport: Option<Arc<dyn EventTransport>>,
    ) -> Self {
        let (local, _) = broadcast::channel(capacity.max(1));
        Self {
            transport,
            channel: channel.into(),
            local,
            metrics: None,
        }
    }

    /// 只使用进程内广播的事件总线
    pub fn local_only(capacity: usize) -> Self {
        Self::new("queue-events", capacity, None)
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 订阅进程内事件
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.local.subscribe()
    }

    pub async fn emit(&self, kind: QueueEventKind, data: Value) {
        let envelope = EventEnvelope {
            event_type: kind.as_str().to_string(),
            data,
            timestamp: Utc::now(),
        };

        if let Some(transport) = &self.transport {
            match serde_json::to_string(&envelope) {
                Ok(payload) => match transport.publish(&self.channel, &payload).await {
                    Ok(()) => {
                        self.record(kind, false);
                        return;
                    }
                    Err(e) => warn!(
                        "Publishing {} via {} failed, falling back to local broadcast: {}",
                        kind.as_str(),
                        transport.name(),
                        e
                    ),
                },
                Err(e) => warn!("Failed to serialize {} event: {}", kind.as_str(), e),
            }
        }

        if self.local.send(envelope).is_err() {
            debug!("No local subscribers for {} event", kind.as_str());
        }
        self.record(kind, self.transport.is_some());
    }

    fn record(&self, kind: QueueEventKind, via_fallback: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_event_published(kind.as_str(), via_fallback);
        }
    }

    /// 队列快照
    pub async fn emit_queue_update(&self, queues: &[QueueInfo]) {
        self.emit(QueueEventKind::QueueUpdate, json!({ "queues": queues }))
            .await;
    }

    pub async fn emit_tasks_added(&self, queue: &str, tasks: &[QueueTask]) {
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        self.emit(
            QueueEventKind::TasksAdded,
            json!({ "queue": queue, "count": tasks.len(), "task_ids": ids }),
        )
        .await;
    }

    pub async fn emit_task_history_update(&self, history: &TaskHistory) {
        self.emit(QueueEventKind::TaskHistoryUpdate, json!({ "history": history }))
            .await;
    }

    pub async fn emit_queues_cleared(&self, queue: Option<&str>, removed: u64) {
        self.emit(
            QueueEventKind::QueuesCleared,
            json!({ "queue": queue, "removed": removed }),
        )
        .await;
    }

    pub async fn emit_task_processing(&self, task: &QueueTask, worker_id: &str) {
        self.emit(
            QueueEventKind::TaskProcessing,
            json!({
                "task_id": task.id,
                "queue": task.queue,
                "task_type": task.task_type,
                "attempt": task.attempts,
                "max_attempts": task.max_attempts,
                "worker_id": worker_id,
            }),
        )
        .await;
    }

    pub async fn emit_task_completed(&self, task: &QueueTask, history: &TaskHistory) {
        self.emit(
            QueueEventKind::TaskCompleted,
            json!({
                "task_id": task.id,
                "queue": task.queue,
                "task_type": task.task_type,
                "history_id": history.id,
                "duration_ms": history.duration_ms,
                "result": history.result,
            }),
        )
        .await;
    }

    pub async fn emit_task_error(&self, task: &QueueTask, history: &TaskHistory) {
        self.emit(
            QueueEventKind::TaskError,
            json!({
                "task_id": task.id,
                "queue": task.queue,
                "task_type": task.task_type,
                "history_id": history.id,
                "attempts": history.attempts,
                "error": history.error,
            }),
        )
        .await;
    }

    pub async fn emit_workflow_created(&self, workflow_id: &str, data: Value) {
        self.emit(
            QueueEventKind::WorkflowCreated,
            json!({ "workflow_id": workflow_id, "workflow": data }),
        )
        .await;
    }

    pub async fn emit_workflow_execution_update(
        &self,
        execution_id: &str,
        status: &str,
        data: Value,
    ) {
        self.emit(
            QueueEventKind::WorkflowExecutionUpdate,
            json!({ "execution_id": execution_id, "status": status, "details": data }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use taskq_core::SchedulerError;

    struct RecordingTransport {
        fail: bool,
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl EventTransport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn publish(&self, channel: &str, payload: &str) -> SchedulerResult<()> {
            if self.fail {
                return Err(SchedulerError::MessageQueue("down".into()));
            }
            self.published
                .lock()
                .unwrap()
                .push((channel.to_string(), payload.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn local_bus_delivers_envelopes() {
        let bus = QueueEventBus::local_only(8);
        let mut rx = bus.subscribe();

        bus.emit_queues_cleared(Some("mail_queue"), 4).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "queues-cleared");
        assert_eq!(event.data["queue"], "mail_queue");
        assert_eq!(event.data["removed"], 4);
    }

    #[tokio::test]
    async fn emitting_without_subscribers_does_not_fail() {
        let bus = QueueEventBus::local_only(8);
        bus.emit_workflow_created("wf-1", json!({"steps": 2})).await;
    }

    #[tokio::test]
    async fn successful_publish_skips_local_broadcast() {
        let transport = Arc::new(RecordingTransport {
            fail: false,
            published: Mutex::new(Vec::new()),
        });
        let bus = QueueEventBus::new("queue-events", 8, Some(transport.clone()));
        let mut rx = bus.subscribe();

        bus.emit_workflow_execution_update("exec-1", "running", json!({}))
            .await;

        let published = transport.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "queue-events");
        let envelope: EventEnvelope = serde_json::from_str(&published[0].1).unwrap();
        assert_eq!(envelope.event_type, "workflow-execution-update");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_publish_falls_back_to_local() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            published: Mutex::new(Vec::new()),
        });
        let bus = QueueEventBus::new("queue-events", 8, Some(transport));
        let mut rx = bus.subscribe();

        bus.emit(QueueEventKind::TasksAdded, json!({"queue": "default"}))
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "tasks-added");
    }
}
