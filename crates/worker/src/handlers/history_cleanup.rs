use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use tracing::info;

use taskq_core::models::{ExecutionContext, TaskKind};
use taskq_core::{
    FieldType, SchedulerError, SchedulerResult, SchemaField, TaskHandler, TaskHistoryRepository,
    TaskSchema,
};

/// 执行历史清理处理器
pub struct HistoryCleanupHandler {
    histories: Arc<dyn TaskHistoryRepository>,
    default_retention_days: i64,
}

impl HistoryCleanupHandler {
    pub fn new(histories: Arc<dyn TaskHistoryRepository>, default_retention_days: i64) -> Self {
        Self {
            histories,
            default_retention_days,
        }
    }
}

fn validate_retention(data: &Value) -> SchedulerResult<()> {
    match data.get("retention_days").and_then(Value::as_i64) {
        Some(days) if days <= 0 => Err(SchedulerError::InvalidTaskParams(format!(
            "保留天数必须大于0: {days}"
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl TaskHandler for HistoryCleanupHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::HistoryCleanup
    }

    fn schema(&self) -> TaskSchema {
        TaskSchema::new(
            TaskKind::HistoryCleanup,
            vec![SchemaField::optional(
                "retention_days",
                FieldType::Integer,
                "保留天数",
            )],
        )
        .with_validator(validate_retention)
    }

    async fn execute(&self, ctx: &ExecutionContext, data: &Value) -> SchedulerResult<Value> {
        let retention_days = data
            .get("retention_days")
            .and_then(Value::as_i64)
            .unwrap_or(self.default_retention_days);
        let cutoff = ctx.started_at - Duration::days(retention_days);

        let deleted = self.histories.delete_older_than(cutoff).await?;
        info!(
            "清理执行历史完成: 删除 {} 条早于 {} 的记录",
            deleted,
            cutoff.to_rfc3339()
        );

        Ok(json!({
            "deleted": deleted,
            "retention_days": retention_days,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskq_core::models::HistoryStatus;
    use taskq_core::{TaskOutcome, TaskStore};
    use taskq_testing_utils::{QueueTaskBuilder, TestDatabase};

    async fn insert_history(db: &TestDatabase, days_ago: i64) {
        let finished_at = Utc::now() - Duration::days(days_ago);
        let task = QueueTaskBuilder::new().processing(1).build();
        db.store
            .finish(TaskOutcome {
                task,
                status: HistoryStatus::Success,
                started_at: finished_at,
                finished_at,
                result: None,
                error: None,
                notification: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deletes_only_expired_history() {
        let db = TestDatabase::new().await.unwrap();
        insert_history(&db, 45).await;
        insert_history(&db, 10).await;
        insert_history(&db, 1).await;

        let handler = HistoryCleanupHandler::new(db.histories.clone(), 30);
        let ctx = ExecutionContext::system("task_history_cleanup", "system_queue");

        let result = handler.execute(&ctx, &json!({})).await.unwrap();
        assert_eq!(result["deleted"], 1);
        assert_eq!(result["retention_days"], 30);

        let result = handler
            .execute(&ctx, &json!({"retention_days": 5}))
            .await
            .unwrap();
        assert_eq!(result["deleted"], 1);
        assert_eq!(db.count_rows("task_history").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejects_non_positive_retention() {
        let db = TestDatabase::new().await.unwrap();
        let handler = HistoryCleanupHandler::new(db.histories.clone(), 30);
        assert!(handler.validate(&json!({"retention_days": 0})).is_err());
        assert!(handler.validate(&json!({"retention_days": "7"})).is_err());
        assert!(handler.validate(&json!({})).is_ok());
    }
}
