use std::time::Duration;

use serde_json::json;
use taskq::{AppMode, Application, ShutdownManager};
use taskq_core::config::{AppConfig, Profile};
use taskq_core::models::{NewQueueTask, QueueDriver};
use taskq_core::QueueAdapter;
use taskq_testing_utils::{RedisTestContainer, TestEnv};
use tokio::time::timeout;

fn starter_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = "sqlite::memory:".to_string();
    config.worker.poll_interval_seconds = 1;
    config.scheduler.interval_seconds = 1;
    config
}

#[tokio::test]
async fn starter_profile_builds_scheduler_and_worker() {
    let app = Application::new(starter_config(), AppMode::All).await.unwrap();

    assert_eq!(app.driver(), QueueDriver::Database);
    assert!(app.scheduler().is_some());
    assert!(app.worker().is_some());
}

#[tokio::test]
async fn mode_selects_components() {
    let scheduler_only = Application::new(starter_config(), AppMode::Scheduler)
        .await
        .unwrap();
    assert!(scheduler_only.scheduler().is_some());
    assert!(scheduler_only.worker().is_none());

    let mut config = starter_config();
    config.worker.enabled = false;
    let nothing = Application::new(config, AppMode::Worker).await.unwrap();
    assert!(nothing.scheduler().is_none());
    assert!(nothing.worker().is_none());
}

#[tokio::test]
async fn redis_driver_without_redis_section_fails() {
    let mut config = starter_config();
    config.queue.driver = Some(QueueDriver::Redis);

    assert!(Application::new(config, AppMode::All).await.is_err());
}

#[tokio::test]
async fn running_app_processes_queued_task_and_stops_on_shutdown() {
    let app = Application::new(starter_config(), AppMode::All).await.unwrap();
    let mut events = app.events().subscribe();

    app.queue()
        .add_task(
            "mail_queue",
            NewQueueTask::new(
                "email_notification_task",
                json!({"to": "ops@example.com", "subject": "hello", "body": "world"}),
            ),
        )
        .await
        .unwrap();

    let shutdown = ShutdownManager::new();
    let rx = shutdown.subscribe().await;
    let app = std::sync::Arc::new(app);
    let runner = {
        let app = app.clone();
        tokio::spawn(async move { app.run(rx).await })
    };

    let completed = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if event.event_type == "task-completed" => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
    })
    .await;
    assert_eq!(completed, Ok(true));

    let queue = app.queue();
    assert!(
        TestEnv::wait_for(
            || {
                let queue = queue.clone();
                async move { queue.get_queue_length("mail_queue").await == 0 }
            },
            Duration::from_secs(2),
        )
        .await
    );

    shutdown.shutdown().await;
    let result = timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert!(result.is_ok());

    let worker = app.worker().unwrap();
    assert!(!worker.is_running());
    assert!(!app.scheduler().unwrap().is_running());
}

#[tokio::test]
#[ignore = "需要Docker运行Redis容器"]
async fn full_profile_runs_without_embedded_worker() {
    let redis = RedisTestContainer::new().await.unwrap();

    let mut config = starter_config();
    config.profile = Profile::Full;
    config.redis = Some(redis.config.clone());
    config.queue.key_prefix = "apptest".to_string();

    let app = Application::new(config, AppMode::All).await.unwrap();
    assert_eq!(app.driver(), QueueDriver::Redis);
    assert!(app.scheduler().is_some());
    assert!(app.worker().is_none());

    app.queue()
        .add_task(
            "webhook_queue",
            NewQueueTask::new("webhook_task", json!({"url": "https://example.com"})),
        )
        .await
        .unwrap();
    assert_eq!(app.queue().get_queue_length("webhook_queue").await, 1);
}
