use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use taskq_core::models::{HistoryStatus, TaskHistory};
use taskq_core::{SchedulerResult, TaskHistoryRepository};

use crate::database::mapping::MappingHelpers;
use crate::observability::StructuredLogger;

const HISTORY_COLUMNS: &str = "id, task_id, queue_task_id, task_type, task_name, queue_name, status, \
     attempts, started_at, finished_at, duration_ms, result, error";

pub struct SqliteTaskHistoryRepository {
    pool: SqlitePool,
}

impl SqliteTaskHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_history(row: &SqliteRow) -> SchedulerResult<TaskHistory> {
        Ok(TaskHistory {
            id: row.try_get("id")?,
            task_id: row.try_get("task_id")?,
            queue_task_id: row.try_get("queue_task_id")?,
            task_type: row.try_get("task_type")?,
            task_name: row.try_get("task_name")?,
            queue_name: row.try_get("queue_name")?,
            status: MappingHelpers::get_parsed::<HistoryStatus>(row, "status")?,
            attempts: row.try_get("attempts")?,
            started_at: MappingHelpers::get_datetime(row, "started_at")?,
            finished_at: MappingHelpers::get_datetime(row, "finished_at")?,
            duration_ms: row.try_get("duration_ms")?,
            result: MappingHelpers::get_opt_json(row, "result")?,
            error: row.try_get("error")?,
        })
    }
}

#[async_trait]
impl TaskHistoryRepository for SqliteTaskHistoryRepository {
    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskHistory>> {
        let sql = format!("SELECT {HISTORY_COLUMNS} FROM task_history WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_history).transpose()
    }

    async fn list_recent(&self, limit: u32) -> SchedulerResult<Vec<TaskHistory>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history ORDER BY finished_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn list_for_definition(
        &self,
        task_id: i64,
        limit: u32,
    ) -> SchedulerResult<Vec<TaskHistory>> {
        let sql = format!(
            "SELECT {HISTORY_COLUMNS} FROM task_history WHERE task_id = ? ORDER BY finished_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(task_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_history).collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> SchedulerResult<u64> {
        let started = std::time::Instant::now();
        let result = sqlx::query("DELETE FROM task_history WHERE finished_at < ?")
            .bind(MappingHelpers::to_millis(cutoff))
            .execute(&self.pool)
            .await?;

        StructuredLogger::log_database_operation(
            "delete_older_than",
            "task_history",
            started.elapsed().as_millis() as u64,
            Some(result.rows_affected()),
        );
        Ok(result.rows_affected())
    }
}
