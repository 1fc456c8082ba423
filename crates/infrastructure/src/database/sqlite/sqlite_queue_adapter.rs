use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use taskq_core::models::{
    ListQueuesOptions, NewQueueTask, Pagination, QueueDriver, QueueInfo, QueueStats,
    QueueStructure, QueueTask, QueueTaskPage, TaskListQuery,
};
use taskq_core::{QueueAdapter, SchedulerError, SchedulerResult};
use tracing::{debug, instrument};

use super::{row_to_queue_task, CLAIMABLE, CLAIM_ORDER, QUEUE_TASK_COLUMNS};
use crate::database::mapping::MappingHelpers;
use crate::observability::StructuredLogger;

/// 基于 `queue_tasks` 表的队列适配器
///
/// 认领依赖单条 `UPDATE ... RETURNING` 语句完成，SQLite 的写锁保证同一任务只会被认领一次。
/// 数据库没有阻塞读取，`pop_task` 忽略超时参数。
pub struct SqliteQueueAdapter {
    pool: SqlitePool,
    known_queues: Vec<String>,
}

impl SqliteQueueAdapter {
    pub fn new(pool: SqlitePool, known_queues: Vec<String>) -> Self {
        Self { pool, known_queues }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn stats_by_queue(&self, queue: Option<&str>) -> SchedulerResult<HashMap<String, QueueStats>> {
        let mut sql = String::from(
            r#"
            SELECT queue,
                   COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) AS depth,
                   COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0) AS running,
                   COALESCE(SUM(CASE WHEN status = 'pending' AND attempts >= max_attempts THEN 1 ELSE 0 END), 0) AS failed
            FROM queue_tasks
            "#,
        );
        if queue.is_some() {
            sql.push_str(" WHERE queue = ?");
        }
        sql.push_str(" GROUP BY queue");

        let mut query = sqlx::query(&sql);
        if let Some(queue) = queue {
            query = query.bind(queue);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut stats = HashMap::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("queue")?;
            let depth: i64 = row.try_get("depth")?;
            let running: i64 = row.try_get("running")?;
            let failed: i64 = row.try_get("failed")?;
            stats.insert(
                name.clone(),
                QueueStats {
                    queue: name,
                    depth: depth.max(0) as u64,
                    running: running.max(0) as u64,
                    failed: failed.max(0) as u64,
                    paused: false,
                },
            );
        }
        Ok(stats)
    }

    async fn try_get_queue_length(&self, queue: &str) -> SchedulerResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM queue_tasks WHERE queue = ? AND status = 'pending'",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn try_get_all_tasks(&self, query: &TaskListQuery) -> SchedulerResult<Vec<QueueTask>> {
        let mut sql = format!("SELECT {QUEUE_TASK_COLUMNS} FROM queue_tasks");
        if query.status.is_some() {
            sql.push_str(" WHERE status = ?");
        }
        sql.push_str(&format!(" ORDER BY {CLAIM_ORDER} LIMIT ? OFFSET ?"));

        let mut q = sqlx::query(&sql);
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        let rows = q
            .bind(i64::from(query.limit()))
            .bind(i64::from(query.offset()))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_queue_task).collect()
    }

    async fn try_list_queues(&self, options: ListQueuesOptions) -> SchedulerResult<Vec<QueueInfo>> {
        let mut stats = self.stats_by_queue(None).await?;
        let mut queues = Vec::new();

        for name in &self.known_queues {
            let queue_stats = stats.remove(name).unwrap_or_else(|| QueueStats::empty(name));
            queues.push(QueueInfo::describe(
                name,
                QueueDriver::Database,
                QueueStructure::Table,
                queue_stats,
                true,
            ));
        }

        if options.include_discovered {
            let discovered: BTreeSet<String> = stats.keys().cloned().collect();
            for name in discovered {
                if let Some(queue_stats) = stats.remove(&name) {
                    queues.push(QueueInfo::describe(
                        &name,
                        QueueDriver::Database,
                        QueueStructure::Table,
                        queue_stats,
                        false,
                    ));
                }
            }
        }

        Ok(queues)
    }

    async fn try_get_queue_tasks(&self, queue: &str, page: Pagination) -> SchedulerResult<QueueTaskPage> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_tasks WHERE queue = ?")
            .bind(queue)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {QUEUE_TASK_COLUMNS} FROM queue_tasks WHERE queue = ? ORDER BY {CLAIM_ORDER} LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(queue)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;

        let tasks = rows
            .iter()
            .map(row_to_queue_task)
            .collect::<SchedulerResult<Vec<_>>>()?;
        Ok(QueueTaskPage::new(queue, tasks, total.max(0) as u64, page))
    }

    async fn try_get_queue_stats(&self, queue: &str) -> SchedulerResult<QueueStats> {
        let mut stats = self.stats_by_queue(Some(queue)).await?;
        Ok(stats.remove(queue).unwrap_or_else(|| QueueStats::empty(queue)))
    }
}

#[async_trait]
impl QueueAdapter for SqliteQueueAdapter {
    fn driver(&self) -> QueueDriver {
        QueueDriver::Database
    }

    #[instrument(skip(self, task), fields(queue = %queue, task_type = %task.task_type))]
    async fn add_task(&self, queue: &str, task: NewQueueTask) -> SchedulerResult<QueueTask> {
        if queue.trim().is_empty() {
            return Err(SchedulerError::InvalidTaskParams("队列名称不能为空".to_string()));
        }

        let task = task.into_queue_task(queue, Utc::now());
        let data = MappingHelpers::json_text(&task.data)?;

        sqlx::query(
            r#"
            INSERT INTO queue_tasks (id, queue, task_type, name, data, priority, status, attempts, max_attempts, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(&task.queue)
        .bind(&task.task_type)
        .bind(&task.name)
        .bind(data)
        .bind(task.priority)
        .bind(task.status.as_str())
        .bind(task.attempts)
        .bind(task.max_attempts)
        .bind(MappingHelpers::to_millis(task.created_at))
        .bind(MappingHelpers::to_millis(task.updated_at))
        .execute(&self.pool)
        .await?;

        StructuredLogger::log_task_enqueued(&task.id, queue, &task.task_type, task.priority);
        Ok(task)
    }

    async fn pop_task(
        &self,
        queue: &str,
        _timeout: Option<Duration>,
    ) -> SchedulerResult<Option<QueueTask>> {
        let now = MappingHelpers::to_millis(Utc::now());
        let sql = format!(
            r#"
            UPDATE queue_tasks
            SET status = 'processing', attempts = attempts + 1, updated_at = ?1, processed_at = ?1
            WHERE id = (
                SELECT id FROM queue_tasks
                WHERE queue = ?2 AND {CLAIMABLE}
                ORDER BY {CLAIM_ORDER}
                LIMIT 1
            ) AND {CLAIMABLE}
            RETURNING {QUEUE_TASK_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(now)
            .bind(queue)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let task = row_to_queue_task(&row)?;
                debug!("Popped task {} from queue {}", task.id, queue);
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    async fn get_queue_length(&self, queue: &str) -> u64 {
        match self.try_get_queue_length(queue).await {
            Ok(length) => length,
            Err(e) => {
                StructuredLogger::log_queue_degraded("database", "get_queue_length", queue, &e);
                0
            }
        }
    }

    async fn get_all_tasks(&self, query: TaskListQuery) -> Vec<QueueTask> {
        match self.try_get_all_tasks(&query).await {
            Ok(tasks) => tasks,
            Err(e) => {
                StructuredLogger::log_queue_degraded("database", "get_all_tasks", "*", &e);
                Vec::new()
            }
        }
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM queue_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_queue(&self, queue: Option<&str>) -> SchedulerResult<u64> {
        let result = match queue {
            Some(queue) => {
                sqlx::query("DELETE FROM queue_tasks WHERE queue = ?")
                    .bind(queue)
                    .execute(&self.pool)
                    .await?
            }
            None => sqlx::query("DELETE FROM queue_tasks").execute(&self.pool).await?,
        };

        StructuredLogger::log_database_operation(
            "clear_queue",
            "queue_tasks",
            0,
            Some(result.rows_affected()),
        );
        Ok(result.rows_affected())
    }

    async fn list_queues(&self, options: ListQueuesOptions) -> Vec<QueueInfo> {
        match self.try_list_queues(options).await {
            Ok(queues) => queues,
            Err(e) => {
                StructuredLogger::log_queue_degraded("database", "list_queues", "*", &e);
                Vec::new()
            }
        }
    }

    async fn get_queue_tasks(&self, queue: &str, page: Pagination) -> QueueTaskPage {
        match self.try_get_queue_tasks(queue, page).await {
            Ok(page) => page,
            Err(e) => {
                StructuredLogger::log_queue_degraded("database", "get_queue_tasks", queue, &e);
                QueueTaskPage::empty(queue, page)
            }
        }
    }

    async fn get_queue_stats(&self, queue: &str) -> QueueStats {
        match self.try_get_queue_stats(queue).await {
            Ok(stats) => stats,
            Err(e) => {
                StructuredLogger::log_queue_degraded("database", "get_queue_stats", queue, &e);
                QueueStats::empty(queue)
            }
        }
    }
}
