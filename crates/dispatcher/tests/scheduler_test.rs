use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use taskq_core::config::SchedulerConfig;
use taskq_core::models::{DefinitionRunStatus, NewTaskDefinition};
use taskq_core::routing::QueueRouting;
use taskq_core::{QueueAdapter, SchedulerError, TaskDefinitionRepository};
use taskq_dispatcher::TaskScheduler;
use taskq_infrastructure::{MetricsCollector, QueueEventBus};
use taskq_testing_utils::{drain_events, event_types, MockQueueAdapter, TestDatabase, TestEnv};

fn scheduler_with(
    db: &TestDatabase,
    queue: Arc<dyn QueueAdapter>,
    events: Arc<QueueEventBus>,
    config: SchedulerConfig,
) -> Arc<TaskScheduler> {
    Arc::new(TaskScheduler::new(
        db.definitions.clone(),
        queue,
        QueueRouting::default(),
        events,
        Arc::new(MetricsCollector::new()),
        config,
    ))
}

#[tokio::test]
async fn due_definition_is_enqueued_and_advanced() {
    let db = TestDatabase::new().await.unwrap();
    let events = Arc::new(QueueEventBus::local_only(64));
    let mut rx = events.subscribe();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        events.clone(),
        SchedulerConfig::default(),
    );

    let definition = db
        .definitions
        .create(
            NewTaskDefinition::new(
                "ping partner",
                "webhook_task",
                json!({"url": "https://example.com/hook"}),
            )
            .every(60)
            .created_by(4),
        )
        .await
        .unwrap();

    let now = Utc::now();
    let report = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.scheduled.len(), 1);

    let task = &report.scheduled[0];
    assert_eq!(task.queue, "webhook_queue");
    assert_eq!(task.name, "ping partner");
    assert_eq!(task.definition_id(), Some(definition.id));
    assert_eq!(task.created_by(), Some(4));
    assert_eq!(task.data["url"], "https://example.com/hook");
    assert_eq!(db.queue.get_queue_length("webhook_queue").await, 1);

    let stored = db.definitions.get_by_id(definition.id).await.unwrap().unwrap();
    assert_eq!(stored.last_status, Some(DefinitionRunStatus::Queued));
    assert_eq!(
        stored.next_run.unwrap().timestamp_millis(),
        (now + Duration::seconds(60)).timestamp_millis()
    );
    assert_eq!(stored.run_count, 0);

    let received = drain_events(&mut rx);
    assert_eq!(event_types(&received), vec!["tasks-added"]);
    assert_eq!(received[0].data["queue"], "webhook_queue");

    // 下次执行时间之前不会再次入队
    let again = scheduler
        .run_pass_at(now + Duration::seconds(30))
        .await
        .unwrap();
    assert_eq!(again.due, 0);
    let later = scheduler
        .run_pass_at(now + Duration::seconds(61))
        .await
        .unwrap();
    assert_eq!(later.scheduled.len(), 1);
}

#[tokio::test]
async fn inactive_and_future_definitions_are_skipped() {
    let db = TestDatabase::new().await.unwrap();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );
    let now = Utc::now();

    db.definitions
        .create(NewTaskDefinition::new("off", "webhook_task", json!({})).every(60).inactive())
        .await
        .unwrap();
    db.definitions
        .create(
            NewTaskDefinition::new("later", "webhook_task", json!({}))
                .every(60)
                .next_run(now + Duration::minutes(5)),
        )
        .await
        .unwrap();

    let report = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(report.due, 0);
    assert!(report.scheduled.is_empty());
}

#[tokio::test]
async fn pass_is_bounded_by_batch_size() {
    let db = TestDatabase::new().await.unwrap();
    let config = SchedulerConfig {
        batch_size: 2,
        ..Default::default()
    };
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        config,
    );

    for i in 0..5 {
        db.definitions
            .create(NewTaskDefinition::new(format!("def-{i}"), "webhook_task", json!({})).every(60))
            .await
            .unwrap();
    }

    let now = Utc::now();
    let first = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(first.scheduled.len(), 2);
    let second = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(second.scheduled.len(), 2);
    let third = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(third.scheduled.len(), 1);
}

#[tokio::test]
async fn one_failing_enqueue_does_not_stop_the_pass() {
    let db = TestDatabase::new().await.unwrap();
    let queue = MockQueueAdapter::new();
    queue.fail_enqueue_for("email_notification_task");
    let scheduler = scheduler_with(
        &db,
        Arc::new(queue.clone()),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );

    let broken = db
        .definitions
        .create(
            NewTaskDefinition::new("digest", "email_notification_task", json!({})).every(60),
        )
        .await
        .unwrap();
    db.definitions
        .create(NewTaskDefinition::new("hook", "webhook_task", json!({})).every(60))
        .await
        .unwrap();

    let report = scheduler.run_pass_at(Utc::now()).await.unwrap();
    assert_eq!(report.due, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.scheduled.len(), 1);
    assert_eq!(queue.tasks_in("webhook_queue").len(), 1);

    // 入队失败的定义保持到期状态，下一轮重新尝试
    let stored = db.definitions.get_by_id(broken.id).await.unwrap().unwrap();
    assert!(stored.next_run.is_none());
    assert!(stored.last_status.is_none());
}

#[tokio::test]
async fn out_of_range_period_does_not_stall_the_pass() {
    let db = TestDatabase::new().await.unwrap();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );

    let rejected = db
        .definitions
        .create(
            NewTaskDefinition::new("forever", "webhook_task", json!({})).every(10_000_000_000_000),
        )
        .await;
    assert!(matches!(rejected, Err(SchedulerError::InvalidTaskParams(_))));

    let huge = db
        .definitions
        .create(NewTaskDefinition::new("forever", "webhook_task", json!({})).every(60))
        .await
        .unwrap();
    db.definitions
        .create(NewTaskDefinition::new("hook", "webhook_task", json!({})).every(60))
        .await
        .unwrap();
    // 绕过仓储校验写入的旧数据
    sqlx::query("UPDATE task_definitions SET period_seconds = ? WHERE id = ?")
        .bind(10_000_000_000_000_i64)
        .bind(huge.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let now = Utc::now();
    let report = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(report.due, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.scheduled.len(), 2);

    let stored = db.definitions.get_by_id(huge.id).await.unwrap().unwrap();
    assert_eq!(
        stored.next_run.unwrap().timestamp_millis(),
        (now + Duration::seconds(3600)).timestamp_millis()
    );
}

#[tokio::test]
async fn cron_definition_uses_cron_next_run() {
    let db = TestDatabase::new().await.unwrap();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );
    let definition = db
        .definitions
        .create(
            NewTaskDefinition::new("cleanup", "task_history_cleanup", json!({})).cron("0 0 3 * * *"),
        )
        .await
        .unwrap();

    let now = Utc::now();
    let report = scheduler.run_pass_at(now).await.unwrap();
    assert_eq!(report.scheduled[0].queue, "system_queue");

    let stored = db.definitions.get_by_id(definition.id).await.unwrap().unwrap();
    let next_run = stored.next_run.unwrap();
    assert!(next_run > now);
    assert!(next_run <= now + Duration::days(1));
}

#[tokio::test]
async fn trigger_now_keeps_next_run() {
    let db = TestDatabase::new().await.unwrap();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );
    let next_run = Utc::now() + Duration::hours(2);
    let definition = db
        .definitions
        .create(
            NewTaskDefinition::new("report", "webhook_task", json!({"url": "https://x"}))
                .every(3600)
                .next_run(next_run),
        )
        .await
        .unwrap();

    let task = scheduler.trigger_now(definition.id, Some(12)).await.unwrap();
    assert!(task.is_manual());
    assert_eq!(task.triggered_by(), Some(12));
    assert_eq!(task.definition_id(), Some(definition.id));

    let stored = db.definitions.get_by_id(definition.id).await.unwrap().unwrap();
    assert_eq!(
        stored.next_run.map(|t| t.timestamp_millis()),
        Some(next_run.timestamp_millis())
    );
    assert!(stored.last_status.is_none());

    let missing = scheduler.trigger_now(9999, None).await.unwrap_err();
    assert!(matches!(
        missing,
        SchedulerError::TaskDefinitionNotFound { id: 9999 }
    ));
}

#[tokio::test]
async fn start_runs_immediately_and_stop_is_idempotent() {
    let db = TestDatabase::new().await.unwrap();
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        SchedulerConfig::default(),
    );
    db.definitions
        .create(NewTaskDefinition::new("hook", "webhook_task", json!({})).every(60))
        .await
        .unwrap();

    scheduler.start().await;
    scheduler.start().await;
    assert!(scheduler.is_running());

    let queue = db.queue.clone();
    let enqueued = TestEnv::wait_for(
        || {
            let queue = queue.clone();
            async move { queue.get_queue_length("webhook_queue").await == 1 }
        },
        StdDuration::from_secs(5),
    )
    .await;
    assert!(enqueued);

    scheduler.stop().await;
    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert_eq!(db.queue.get_queue_length("webhook_queue").await, 1);
}

#[tokio::test]
async fn scheduler_loop_survives_failed_pass() {
    let db = TestDatabase::new().await.unwrap();
    let config = SchedulerConfig {
        interval_seconds: 1,
        ..SchedulerConfig::default()
    };
    let scheduler = scheduler_with(
        &db,
        db.queue.clone(),
        Arc::new(QueueEventBus::local_only(16)),
        config,
    );
    db.definitions
        .create(NewTaskDefinition::new("hook", "webhook_task", json!({})).every(60))
        .await
        .unwrap();

    sqlx::query("ALTER TABLE task_definitions RENAME TO task_definitions_offline")
        .execute(&db.pool)
        .await
        .unwrap();
    scheduler.start().await;
    tokio::time::sleep(StdDuration::from_millis(1500)).await;
    assert!(scheduler.is_running());
    assert_eq!(db.queue.get_queue_length("webhook_queue").await, 0);

    sqlx::query("ALTER TABLE task_definitions_offline RENAME TO task_definitions")
        .execute(&db.pool)
        .await
        .unwrap();
    let queue = db.queue.clone();
    let enqueued = TestEnv::wait_for(
        || {
            let queue = queue.clone();
            async move { queue.get_queue_length("webhook_queue").await == 1 }
        },
        StdDuration::from_secs(5),
    )
    .await;
    assert!(enqueued);

    scheduler.stop().await;
}
