use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use taskq_core::models::UserIdentity;
use taskq_core::{SchedulerResult, UserDirectory};

/// 从 `users` 与 `user_roles` 表加载执行身份
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建用户并授予角色，返回用户ID
    pub async fn create_user(&self, username: &str, roles: &[&str]) -> SchedulerResult<i64> {
        let mut tx = self.pool.begin().await?;
        let user_id = sqlx::query("INSERT INTO users (username, is_active, created_at) VALUES (?, 1, ?)")
            .bind(username)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for role in roles {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?, ?)")
                .bind(user_id)
                .bind(*role)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(user_id)
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn load_with_roles(&self, user_id: i64) -> SchedulerResult<Option<UserIdentity>> {
        let row = sqlx::query("SELECT id, username FROM users WHERE id = ? AND is_active = 1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let roles: Vec<String> =
            sqlx::query_scalar("SELECT role FROM user_roles WHERE user_id = ? ORDER BY role")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(UserIdentity {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            roles,
        }))
    }
}
