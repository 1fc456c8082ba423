use sqlx::SqlitePool;
use taskq_core::SchedulerResult;
use tracing::debug;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS queue_tasks (
        id TEXT PRIMARY KEY,
        queue TEXT NOT NULL,
        task_type TEXT NOT NULL,
        name TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}',
        priority INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        processed_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_definitions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        task_type TEXT NOT NULL,
        data TEXT NOT NULL DEFAULT '{}',
        is_active INTEGER NOT NULL DEFAULT 1,
        period_seconds INTEGER,
        cron_expr TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        created_by INTEGER,
        last_run INTEGER,
        next_run INTEGER,
        last_status TEXT,
        last_error TEXT,
        run_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER,
        queue_task_id TEXT NOT NULL,
        task_type TEXT NOT NULL,
        task_name TEXT NOT NULL,
        queue_name TEXT NOT NULL,
        status TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 0,
        started_at INTEGER NOT NULL,
        finished_at INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        result TEXT,
        error TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        message TEXT NOT NULL,
        level TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        read_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_outbox (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recipient TEXT NOT NULL,
        subject TEXT NOT NULL,
        body TEXT NOT NULL,
        created_by INTEGER,
        created_at INTEGER NOT NULL,
        sent_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id INTEGER NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (user_id, role),
        FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_queue_tasks_claim ON queue_tasks(queue, status, priority DESC, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_queue_tasks_status_updated ON queue_tasks(status, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_task_definitions_due ON task_definitions(is_active, next_run)",
    "CREATE INDEX IF NOT EXISTS idx_task_history_task_id ON task_history(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_task_history_finished_at ON task_history(finished_at)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, read_at)",
];

/// 运行数据库迁移，可重复执行
pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
    debug!("Running SQLite database migrations");

    for table_sql in TABLES {
        sqlx::query(table_sql).execute(pool).await?;
    }

    for index_sql in INDEXES {
        sqlx::query(index_sql).execute(pool).await?;
    }

    debug!("Successfully completed SQLite database migrations");
    Ok(())
}
