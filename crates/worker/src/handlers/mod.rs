//! 内置任务处理器

pub mod email;
pub mod history_cleanup;
pub mod webhook;

use std::sync::Arc;

use taskq_core::{EmailOutbox, SchedulerResult, TaskHistoryRepository};

pub use email::EmailNotificationHandler;
pub use history_cleanup::HistoryCleanupHandler;
pub use webhook::{WebhookHandler, WebhookParams};

use crate::registry::HandlerRegistry;

/// 注册全部内置处理器
pub async fn register_builtin_handlers(
    registry: &HandlerRegistry,
    outbox: Arc<dyn EmailOutbox>,
    histories: Arc<dyn TaskHistoryRepository>,
    history_retention_days: i64,
) -> SchedulerResult<()> {
    registry
        .register(Arc::new(EmailNotificationHandler::new(outbox)))
        .await?;
    registry.register(Arc::new(WebhookHandler::new())).await?;
    registry
        .register(Arc::new(HistoryCleanupHandler::new(
            histories,
            history_retention_days,
        )))
        .await?;
    Ok(())
}
