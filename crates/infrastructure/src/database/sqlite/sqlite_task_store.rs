use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use taskq_core::models::{DefinitionRunStatus, QueueTask, TaskHistory};
use taskq_core::{SchedulerResult, TaskOutcome, TaskStore};
use tracing::{debug, instrument, warn};

use super::{row_to_queue_task, CLAIMABLE, CLAIM_ORDER, QUEUE_TASK_COLUMNS};
use crate::database::mapping::MappingHelpers;

/// Worker 侧的任务存储
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn fetch_pending(&self, limit: u32) -> SchedulerResult<Vec<QueueTask>> {
        let sql = format!(
            "SELECT {QUEUE_TASK_COLUMNS} FROM queue_tasks WHERE {CLAIMABLE} ORDER BY {CLAIM_ORDER} LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_queue_task).collect()
    }

    async fn claim(&self, id: &str, now: DateTime<Utc>) -> SchedulerResult<Option<QueueTask>> {
        let sql = format!(
            r#"
            UPDATE queue_tasks
            SET status = 'processing', attempts = attempts + 1, updated_at = ?1, processed_at = ?1
            WHERE id = ?2 AND {CLAIMABLE}
            RETURNING {QUEUE_TASK_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(MappingHelpers::to_millis(now))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_queue_task).transpose()
    }

    async fn release_for_retry(
        &self,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE queue_tasks SET status = 'pending', error = ?, updated_at = ? WHERE id = ? AND status = 'processing'",
        )
        .bind(error)
        .bind(MappingHelpers::to_millis(now))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Task {} was not processing when released for retry", id);
        }
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(task_id = %outcome.task.id, status = %outcome.status))]
    async fn finish(&self, outcome: TaskOutcome) -> SchedulerResult<TaskHistory> {
        let task = &outcome.task;
        let result_text = outcome
            .result
            .as_ref()
            .map(MappingHelpers::json_text)
            .transpose()?;
        let started_ms = MappingHelpers::to_millis(outcome.started_at);
        let finished_ms = MappingHelpers::to_millis(outcome.finished_at);
        let duration_ms = outcome.duration_ms();
        let definition_id = task.definition_id();

        let mut tx = self.pool.begin().await?;

        // 负载中带有历史ID时更新原记录，记录不存在则新建
        let mut history_id = None;
        if let Some(existing) = task.history_id() {
            let updated = sqlx::query(
                r#"
                UPDATE task_history
                SET status = ?, attempts = ?, started_at = ?, finished_at = ?, duration_ms = ?, result = ?, error = ?
                WHERE id = ?
                "#,
            )
            .bind(outcome.status.as_str())
            .bind(task.attempts)
            .bind(started_ms)
            .bind(finished_ms)
            .bind(duration_ms)
            .bind(&result_text)
            .bind(&outcome.error)
            .bind(existing)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() > 0 {
                history_id = Some(existing);
            }
        }

        let history_id = match history_id {
            Some(id) => id,
            None => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO task_history (task_id, queue_task_id, task_type, task_name, queue_name, status, attempts, started_at, finished_at, duration_ms, result, error)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(definition_id)
                .bind(&task.id)
                .bind(&task.task_type)
                .bind(&task.name)
                .bind(&task.queue)
                .bind(outcome.status.as_str())
                .bind(task.attempts)
                .bind(started_ms)
                .bind(finished_ms)
                .bind(duration_ms)
                .bind(&result_text)
                .bind(&outcome.error)
                .execute(&mut *tx)
                .await?;
                inserted.last_insert_rowid()
            }
        };

        if let Some(definition_id) = definition_id {
            let last_status: DefinitionRunStatus = outcome.status.into();
            sqlx::query(
                r#"
                UPDATE task_definitions
                SET run_count = run_count + 1, last_status = ?, last_run = ?, last_error = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(last_status.as_str())
            .bind(finished_ms)
            .bind(&outcome.error)
            .bind(finished_ms)
            .bind(definition_id)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(notification) = &outcome.notification {
            sqlx::query(
                "INSERT INTO notifications (user_id, title, message, level, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(notification.user_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.level.as_str())
            .bind(finished_ms)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM queue_tasks WHERE id = ?")
            .bind(&task.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!("Task {} finalized with history {}", task.id, history_id);

        Ok(TaskHistory {
            id: history_id,
            task_id: definition_id,
            queue_task_id: task.id.clone(),
            task_type: task.task_type.clone(),
            task_name: task.name.clone(),
            queue_name: task.queue.clone(),
            status: outcome.status,
            attempts: task.attempts,
            started_at: outcome.started_at,
            finished_at: outcome.finished_at,
            duration_ms,
            result: outcome.result,
            error: outcome.error,
        })
    }

    async fn reset_orphans(
        &self,
        stale_before: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<Vec<QueueTask>> {
        let mut sql = String::from(
            "UPDATE queue_tasks SET status = 'pending', updated_at = ? WHERE status = 'processing'",
        );
        if stale_before.is_some() {
            sql.push_str(" AND updated_at < ?");
        }
        sql.push_str(&format!(" RETURNING {QUEUE_TASK_COLUMNS}"));

        let mut query = sqlx::query(&sql).bind(MappingHelpers::to_millis(now));
        if let Some(threshold) = stale_before {
            query = query.bind(MappingHelpers::to_millis(threshold));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_queue_task).collect()
    }
}
