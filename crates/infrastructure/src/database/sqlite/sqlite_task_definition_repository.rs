use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use taskq_core::models::{
    DefinitionRunStatus, NewTaskDefinition, TaskDefinition, MAX_PERIOD_SECONDS,
};
use taskq_core::{SchedulerError, SchedulerResult, TaskDefinitionRepository};
use tracing::{debug, instrument};

use crate::database::mapping::MappingHelpers;

const DEFINITION_COLUMNS: &str = "id, name, task_type, data, is_active, period_seconds, cron_expr, \
     priority, max_attempts, created_by, last_run, next_run, last_status, last_error, run_count, \
     created_at, updated_at";

pub struct SqliteTaskDefinitionRepository {
    pool: SqlitePool,
}

impl SqliteTaskDefinitionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_definition(row: &SqliteRow) -> SchedulerResult<TaskDefinition> {
        let is_active: i64 = row.try_get("is_active")?;
        Ok(TaskDefinition {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            task_type: row.try_get("task_type")?,
            data: MappingHelpers::get_json(row, "data")?,
            is_active: is_active != 0,
            period_seconds: row.try_get("period_seconds")?,
            cron_expr: row.try_get("cron_expr")?,
            priority: row.try_get("priority")?,
            max_attempts: row.try_get("max_attempts")?,
            created_by: row.try_get("created_by")?,
            last_run: MappingHelpers::get_opt_datetime(row, "last_run")?,
            next_run: MappingHelpers::get_opt_datetime(row, "next_run")?,
            last_status: MappingHelpers::get_opt_parsed::<DefinitionRunStatus>(row, "last_status")?,
            last_error: row.try_get("last_error")?,
            run_count: row.try_get("run_count")?,
            created_at: MappingHelpers::get_datetime(row, "created_at")?,
            updated_at: MappingHelpers::get_datetime(row, "updated_at")?,
        })
    }
}

#[async_trait]
impl TaskDefinitionRepository for SqliteTaskDefinitionRepository {
    #[instrument(skip(self, definition), fields(name = %definition.name, task_type = %definition.task_type))]
    async fn create(&self, definition: NewTaskDefinition) -> SchedulerResult<TaskDefinition> {
        if definition.name.trim().is_empty() {
            return Err(SchedulerError::InvalidTaskParams("任务定义名称不能为空".to_string()));
        }
        if let Some(period) = definition.period_seconds {
            if period <= 0 || period > MAX_PERIOD_SECONDS {
                return Err(SchedulerError::InvalidTaskParams(format!(
                    "执行间隔必须在 1..={MAX_PERIOD_SECONDS} 秒之间: {period}"
                )));
            }
        }

        let now = MappingHelpers::to_millis(Utc::now());
        let sql = format!(
            r#"
            INSERT INTO task_definitions (name, task_type, data, is_active, period_seconds, cron_expr, priority, max_attempts, created_by, next_run, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {DEFINITION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&definition.name)
            .bind(&definition.task_type)
            .bind(MappingHelpers::json_text(&definition.data)?)
            .bind(definition.is_active)
            .bind(definition.period_seconds)
            .bind(&definition.cron_expr)
            .bind(definition.priority)
            .bind(definition.max_attempts.max(1))
            .bind(definition.created_by)
            .bind(MappingHelpers::opt_to_millis(definition.next_run))
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_definition(&row)?;
        debug!("Created task definition {} ({})", created.id, created.name);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> SchedulerResult<Option<TaskDefinition>> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM task_definitions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_definition).transpose()
    }

    async fn list(&self) -> SchedulerResult<Vec<TaskDefinition>> {
        let sql = format!("SELECT {DEFINITION_COLUMNS} FROM task_definitions ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_definition).collect()
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> SchedulerResult<Vec<TaskDefinition>> {
        // next_run 为空的定义排在最前
        let sql = format!(
            r#"
            SELECT {DEFINITION_COLUMNS} FROM task_definitions
            WHERE is_active = 1 AND (next_run IS NULL OR next_run <= ?)
            ORDER BY next_run ASC, id ASC
            LIMIT ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(MappingHelpers::to_millis(now))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_definition).collect()
    }

    async fn mark_queued(
        &self,
        id: i64,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE task_definitions SET last_run = ?, next_run = ?, last_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(MappingHelpers::to_millis(last_run))
        .bind(MappingHelpers::to_millis(next_run))
        .bind(DefinitionRunStatus::Queued.as_str())
        .bind(MappingHelpers::to_millis(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskDefinitionNotFound { id });
        }
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE task_definitions SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(MappingHelpers::to_millis(Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::TaskDefinitionNotFound { id });
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM task_definitions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
