use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use taskq_core::config::DatabaseConfig;
use taskq_core::SchedulerResult;
use tracing::{debug, info};

use super::migrations::run_migrations;

/// 创建SQLite连接池并运行迁移
pub async fn create_pool(config: &DatabaseConfig) -> SchedulerResult<SqlitePool> {
    if config.is_memory() {
        return connect_in_memory().await;
    }

    if let Some(parent) = database_file_path(&config.url).and_then(|p| p.parent().map(PathBuf::from)) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(&parent).await.map_err(|e| {
                taskq_core::SchedulerError::Configuration(format!(
                    "无法创建数据库目录 {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    debug!("Creating SQLite pool at: {}", config.url);

    let connect_options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_seconds)))
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;

    info!("SQLite database ready: {}", config.url);
    Ok(pool)
}

/// 单连接的内存数据库
///
/// 内存数据库随连接关闭而消失，因此连接永不过期。
pub async fn connect_in_memory() -> SchedulerResult<SqlitePool> {
    let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(connect_options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

fn database_file_path(url: &str) -> Option<PathBuf> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}
