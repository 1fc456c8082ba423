use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use taskq_core::models::OutgoingEmail;
use taskq_core::{EmailOutbox, SchedulerResult};

use crate::database::mapping::MappingHelpers;

/// 写入 `email_outbox` 表的发件箱，由外部投递进程发送
pub struct SqliteEmailOutbox {
    pool: SqlitePool,
}

impl SqliteEmailOutbox {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmailOutbox for SqliteEmailOutbox {
    async fn stage(&self, email: OutgoingEmail) -> SchedulerResult<i64> {
        let result = sqlx::query(
            "INSERT INTO email_outbox (recipient, subject, body, created_by, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&email.recipient)
        .bind(&email.subject)
        .bind(&email.body)
        .bind(email.created_by)
        .bind(MappingHelpers::to_millis(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}
