use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use taskq_core::config::WorkerConfig;
use taskq_core::models::{
    DefinitionRunStatus, ExecutionIdentity, HistoryStatus, NewQueueTask, NewTaskDefinition,
    QueueTask, TaskKind, TaskListQuery, UserIdentity,
};
use taskq_core::{
    QueueAdapter, TaskDefinitionRepository, TaskHandler, TaskHistoryRepository, TaskStore,
};
use taskq_infrastructure::QueueEventBus;
use taskq_testing_utils::{drain_events, event_types, MockTaskHandler, TestDatabase, TestEnv};
use taskq_worker::{ExecutionOutcome, HandlerRegistry, TaskWorker};

async fn worker_with(
    db: &TestDatabase,
    handler: Arc<dyn TaskHandler>,
    config: WorkerConfig,
) -> (Arc<TaskWorker>, Arc<QueueEventBus>) {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(handler).await.unwrap();
    registry.initialize().await.unwrap();

    let events = Arc::new(QueueEventBus::local_only(256));
    let worker = TaskWorker::builder(db.store.clone(), db.queue.clone(), registry)
        .users(db.users.clone())
        .events(events.clone())
        .config(config)
        .worker_id("test-worker")
        .build();
    (Arc::new(worker), events)
}

async fn enqueue(db: &TestDatabase, task_type: &str, data: Value, max_attempts: i32) -> QueueTask {
    db.queue
        .add_task(
            "webhook_queue",
            NewQueueTask::new(task_type, data).with_max_attempts(max_attempts),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn successful_task_is_finalized_with_history() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, events) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    let mut rx = events.subscribe();

    let definition = db
        .definitions
        .create(NewTaskDefinition::new("hook", "webhook_task", json!({})).every(60))
        .await
        .unwrap();
    let task = enqueue(
        &db,
        "webhook_task",
        json!({"task_definition_id": definition.id}),
        3,
    )
    .await;

    assert_eq!(worker.process_pass().await.unwrap(), 1);
    assert_eq!(handler.call_count(), 1);
    assert_eq!(db.count_rows("queue_tasks").await.unwrap(), 0);

    let histories = db.histories.list_recent(10).await.unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].queue_task_id, task.id);
    assert_eq!(histories[0].status, HistoryStatus::Success);
    assert_eq!(histories[0].attempts, 1);
    assert_eq!(histories[0].task_id, Some(definition.id));
    assert_eq!(histories[0].result, Some(json!({"ok": true})));

    let stored = db.definitions.get_by_id(definition.id).await.unwrap().unwrap();
    assert_eq!(stored.run_count, 1);
    assert_eq!(stored.last_status, Some(DefinitionRunStatus::Success));

    let received = drain_events(&mut rx);
    assert_eq!(
        event_types(&received),
        vec![
            "task-processing",
            "task-completed",
            "task-history-update",
            "queue-update"
        ]
    );
}

#[tokio::test]
async fn failing_task_retries_until_attempts_are_exhausted() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::failing(TaskKind::Webhook, "endpoint down"));
    let (worker, events) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    let mut rx = events.subscribe();
    let task = enqueue(&db, "webhook_task", json!({}), 3).await;

    for attempt in 1..=2 {
        assert_eq!(worker.process_pass().await.unwrap(), 1);
        let pending = db.queue.get_all_tasks(TaskListQuery::default()).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, attempt);
        assert!(pending[0].error.as_deref().unwrap().contains("endpoint down"));
        assert!(db.histories.list_recent(10).await.unwrap().is_empty());
    }
    // 重试期间不发出终态事件
    assert_eq!(
        event_types(&drain_events(&mut rx)),
        vec!["task-processing", "task-processing"]
    );

    assert_eq!(worker.process_pass().await.unwrap(), 1);
    assert_eq!(handler.call_count(), 3);
    assert_eq!(db.count_rows("queue_tasks").await.unwrap(), 0);

    let histories = db.histories.list_recent(10).await.unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].queue_task_id, task.id);
    assert_eq!(histories[0].status, HistoryStatus::Error);
    assert_eq!(histories[0].attempts, 3);
    assert!(histories[0].error.as_deref().unwrap().contains("endpoint down"));
    assert!(event_types(&drain_events(&mut rx)).contains(&"task-error"));

    // 不会出现第四次尝试
    assert_eq!(worker.process_pass().await.unwrap(), 0);
    assert_eq!(handler.call_count(), 3);
}

#[tokio::test]
async fn task_recovers_after_transient_failures() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::failing_times(TaskKind::Webhook, 1));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    worker.process_pass().await.unwrap();
    worker.process_pass().await.unwrap();

    let histories = db.histories.list_recent(10).await.unwrap();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].status, HistoryStatus::Success);
    assert_eq!(histories[0].attempts, 2);
}

#[tokio::test]
async fn retry_error_is_truncated() {
    let db = TestDatabase::new().await.unwrap();
    let message = "x".repeat(500);
    let handler = Arc::new(MockTaskHandler::failing(TaskKind::Webhook, &message));
    let config = WorkerConfig {
        retry_error_max_chars: 50,
        ..Default::default()
    };
    let (worker, _) = worker_with(&db, handler, config).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    worker.process_pass().await.unwrap();
    let pending = db.queue.get_all_tasks(TaskListQuery::default()).await;
    assert_eq!(pending[0].error.as_deref().unwrap().chars().count(), 50);
}

#[tokio::test]
async fn unknown_task_type_ends_in_error_history() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    let task = enqueue(&db, "email_notification_task", json!({}), 1).await;

    let claimed = db.queue.get_all_tasks(TaskListQuery::default()).await;
    let outcome = worker.execute_task(claimed[0].clone()).await.unwrap();
    match outcome {
        ExecutionOutcome::Failed(history) => {
            assert_eq!(history.queue_task_id, task.id);
            let error = history.error.unwrap();
            assert!(error.contains("email_notification_task"));
            assert!(error.contains("webhook_task"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(handler.call_count(), 0);
}

#[tokio::test]
async fn claimed_task_is_skipped() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    let task = enqueue(&db, "webhook_task", json!({}), 3).await;

    db.store.claim(&task.id, Utc::now()).await.unwrap().unwrap();
    let outcome = worker.execute_task(task).await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Skipped);
    assert!(!outcome.is_terminal());
    assert_eq!(handler.call_count(), 0);
}

#[tokio::test]
async fn creator_identity_is_loaded_with_roles() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;

    let alice = db.users.create_user("alice", &["admin", "editor"]).await.unwrap();
    enqueue(&db, "webhook_task", json!({"created_by": alice}), 3).await;
    enqueue(&db, "webhook_task", json!({"created_by": 999}), 3).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    assert_eq!(worker.process_pass().await.unwrap(), 3);

    let identities: Vec<ExecutionIdentity> =
        handler.contexts().into_iter().map(|c| c.identity).collect();
    assert_eq!(identities.len(), 3);
    assert!(identities.contains(&ExecutionIdentity::User(UserIdentity {
        id: alice,
        username: "alice".to_string(),
        roles: vec!["admin".to_string(), "editor".to_string()],
    })));
    // 不存在的用户与无创建者的任务都以系统身份执行
    assert_eq!(
        identities
            .iter()
            .filter(|i| **i == ExecutionIdentity::System)
            .count(),
        2
    );
}

#[tokio::test]
async fn manual_failure_notifies_trigger_with_truncated_message() {
    let db = TestDatabase::new().await.unwrap();
    let message = "boom ".repeat(200);
    let handler = Arc::new(MockTaskHandler::failing(TaskKind::Webhook, &message));
    let (worker, _) = worker_with(&db, handler, WorkerConfig::default()).await;
    enqueue(
        &db,
        "webhook_task",
        json!({"manual": true, "triggered_by": 7}),
        1,
    )
    .await;

    worker.process_pass().await.unwrap();

    let rows: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT user_id, level, message FROM notifications")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, 7);
    assert_eq!(rows[0].1, "error");
    assert!(rows[0].2.chars().count() <= 200);

    // 历史记录保留完整错误
    let history = &db.histories.list_recent(1).await.unwrap()[0];
    assert!(history.error.as_deref().unwrap().contains(message.trim_end()));
}

#[tokio::test]
async fn manual_success_notifies_trigger() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler, WorkerConfig::default()).await;
    enqueue(&db, "webhook_task", json!({"manual": true, "triggered_by": 3}), 3).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    worker.process_pass().await.unwrap();

    let levels: Vec<String> = sqlx::query_scalar("SELECT level FROM notifications")
        .fetch_all(&db.pool)
        .await
        .unwrap();
    assert_eq!(levels, vec!["success"]);
}

#[tokio::test]
async fn pass_is_bounded_by_batch_size() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    for _ in 0..5 {
        enqueue(&db, "webhook_task", json!({}), 3).await;
    }

    assert_eq!(worker.process_pass().await.unwrap(), 3);
    assert_eq!(worker.process_pass().await.unwrap(), 2);
    assert_eq!(handler.call_count(), 5);
}

#[tokio::test]
async fn overlapping_pass_is_skipped() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(
        MockTaskHandler::succeeding(TaskKind::Webhook).with_delay(StdDuration::from_millis(300)),
    );
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    let (first, second) = tokio::join!(worker.process_pass(), async {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        worker.process_pass().await
    });
    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 0);
    assert_eq!(handler.call_count(), 1);
}

#[tokio::test]
async fn fresh_worker_resets_every_processing_task() {
    let db = TestDatabase::new().await.unwrap();
    let now = Utc::now();
    let registry = Arc::new(HandlerRegistry::new());
    let worker = TaskWorker::builder(db.store.clone(), db.queue.clone(), registry)
        .started_at(now)
        .build();

    let task = enqueue(&db, "webhook_task", json!({}), 3).await;
    db.store
        .claim(&task.id, now - Duration::seconds(5))
        .await
        .unwrap();

    let report = worker.recover_orphans_at(now).await.unwrap();
    assert!(report.startup);
    assert_eq!(report.reset, 1);
    assert_eq!(report.abandoned, 0);

    let stats = db.queue.get_queue_stats("webhook_queue").await;
    assert_eq!(stats.depth, 1);
    assert_eq!(stats.running, 0);

    // 再次恢复不会重复处理
    let again = worker.recover_orphans_at(now).await.unwrap();
    assert_eq!(again.reset, 0);
    assert_eq!(db.count_rows("queue_tasks").await.unwrap(), 1);
}

#[tokio::test]
async fn settled_worker_only_resets_stale_tasks() {
    let db = TestDatabase::new().await.unwrap();
    let now = Utc::now();
    let registry = Arc::new(HandlerRegistry::new());
    let worker = TaskWorker::builder(db.store.clone(), db.queue.clone(), registry)
        .started_at(now - Duration::seconds(40))
        .build();

    let task = enqueue(&db, "webhook_task", json!({}), 3).await;
    db.store
        .claim(&task.id, now - Duration::seconds(30))
        .await
        .unwrap();

    let report = worker.recover_orphans_at(now).await.unwrap();
    assert!(!report.startup);
    assert_eq!(report.reset, 0);
    assert_eq!(db.queue.get_queue_stats("webhook_queue").await.running, 1);

    // 超过两分钟未更新后被恢复
    let later = worker
        .recover_orphans_at(now + Duration::seconds(100))
        .await
        .unwrap();
    assert_eq!(later.reset, 1);
    assert_eq!(db.queue.get_queue_stats("webhook_queue").await.depth, 1);
}

#[tokio::test]
async fn exhausted_orphan_is_abandoned_as_error() {
    let db = TestDatabase::new().await.unwrap();
    let now = Utc::now();
    let registry = Arc::new(HandlerRegistry::new());
    let worker = TaskWorker::builder(db.store.clone(), db.queue.clone(), registry)
        .started_at(now)
        .build();

    let task = enqueue(&db, "webhook_task", json!({"manual": true, "triggered_by": 4}), 1).await;
    db.store.claim(&task.id, now).await.unwrap();

    let report = worker.recover_orphans_at(now).await.unwrap();
    assert_eq!(report.reset, 0);
    assert_eq!(report.abandoned, 1);
    assert_eq!(db.count_rows("queue_tasks").await.unwrap(), 0);
    assert_eq!(db.count_rows("notifications").await.unwrap(), 1);

    let history = &db.histories.list_recent(1).await.unwrap()[0];
    assert_eq!(history.queue_task_id, task.id);
    assert_eq!(history.status, HistoryStatus::Error);
}

#[tokio::test]
async fn start_processes_queue_and_stop_is_idempotent() {
    let db = TestDatabase::new().await.unwrap();
    let handler = Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook));
    let (worker, _) = worker_with(&db, handler.clone(), WorkerConfig::default()).await;
    enqueue(&db, "webhook_task", json!({}), 3).await;

    worker.start().await;
    worker.start().await;
    assert!(worker.is_running());

    let done = TestEnv::wait_for(
        || {
            let handler = handler.clone();
            async move { handler.call_count() == 1 }
        },
        StdDuration::from_secs(5),
    )
    .await;
    assert!(done);

    worker.stop().await;
    worker.stop().await;
    assert!(!worker.is_running());
    assert_eq!(db.histories.list_recent(10).await.unwrap().len(), 1);
}
