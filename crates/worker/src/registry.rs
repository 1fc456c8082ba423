use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};
use tracing::{error, info};

use taskq_core::models::TaskKind;
use taskq_core::{SchedulerError, SchedulerResult, TaskHandler};

/// 任务处理器注册表
///
/// 启动阶段通过 `register` 收集处理器，首次 `initialize` 时冻结为只读表。
/// 并发调用 `initialize` 时，后到的调用等待第一次初始化完成。
pub struct HandlerRegistry {
    pending: RwLock<Vec<Arc<dyn TaskHandler>>>,
    handlers: OnceCell<HashMap<TaskKind, Arc<dyn TaskHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(Vec::new()),
            handlers: OnceCell::new(),
        }
    }

    /// 注册处理器，同一任务类型重复注册是致命的配置错误
    pub async fn register(&self, handler: Arc<dyn TaskHandler>) -> SchedulerResult<()> {
        if self.handlers.initialized() {
            return Err(SchedulerError::Configuration(format!(
                "处理器注册表已初始化，无法再注册 {}",
                handler.kind()
            )));
        }

        let kind = handler.kind();
        let mut pending = self.pending.write().await;
        if pending.iter().any(|h| h.kind() == kind) {
            error!("任务类型 {} 的处理器重复注册", kind);
            return Err(SchedulerError::DuplicateHandler(kind.to_string()));
        }
        pending.push(handler);
        Ok(())
    }

    /// 冻结注册表，可重复调用
    pub async fn initialize(&self) -> SchedulerResult<()> {
        self.table().await.map(|_| ())
    }

    async fn table(&self) -> SchedulerResult<&HashMap<TaskKind, Arc<dyn TaskHandler>>> {
        self.handlers
            .get_or_try_init(|| async {
                let pending = self.pending.read().await;
                let mut table = HashMap::with_capacity(pending.len());
                for handler in pending.iter() {
                    let kind = handler.kind();
                    if table.insert(kind, Arc::clone(handler)).is_some() {
                        return Err(SchedulerError::DuplicateHandler(kind.to_string()));
                    }
                }
                info!("处理器注册表初始化完成，共 {} 个任务类型", table.len());
                Ok(table)
            })
            .await
    }

    /// 按任务类型查找处理器，找不到时错误中列出所有已知类型
    pub async fn get_handler(&self, task_type: &str) -> SchedulerResult<Arc<dyn TaskHandler>> {
        let table = self.table().await?;
        task_type
            .parse::<TaskKind>()
            .ok()
            .and_then(|kind| table.get(&kind))
            .cloned()
            .ok_or_else(|| SchedulerError::HandlerNotFound {
                task_type: task_type.to_string(),
                known: sorted_types(table),
            })
    }

    pub async fn has_handler(&self, task_type: &str) -> SchedulerResult<bool> {
        let table = self.table().await?;
        Ok(task_type
            .parse::<TaskKind>()
            .map(|kind| table.contains_key(&kind))
            .unwrap_or(false))
    }

    pub async fn get_all_task_types(&self) -> SchedulerResult<Vec<String>> {
        Ok(sorted_types(self.table().await?))
    }

    /// 依次清理所有处理器，单个失败只记录日志
    pub async fn cleanup_all(&self) {
        let Some(table) = self.handlers.get() else {
            return;
        };
        for (kind, handler) in table {
            if let Err(e) = handler.cleanup().await {
                error!("处理器 {} 清理失败: {}", kind, e);
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_types(table: &HashMap<TaskKind, Arc<dyn TaskHandler>>) -> Vec<String> {
    let mut kinds: Vec<TaskKind> = table.keys().copied().collect();
    kinds.sort();
    kinds.into_iter().map(|k| k.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskq_testing_utils::MockTaskHandler;

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = HandlerRegistry::new();
        registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook)))
            .await
            .unwrap();

        let err = registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook)))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateHandler(ref t) if t == "webhook_task"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn unknown_type_lists_known_types() {
        let registry = HandlerRegistry::new();
        registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook)))
            .await
            .unwrap();
        registry
            .register(Arc::new(MockTaskHandler::succeeding(
                TaskKind::EmailNotification,
            )))
            .await
            .unwrap();

        let err = registry.get_handler("report_task").await.err().unwrap();
        match err {
            SchedulerError::HandlerNotFound { task_type, known } => {
                assert_eq!(task_type, "report_task");
                assert_eq!(known, vec!["email_notification_task", "webhook_task"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        // 合法但未注册的类型同样找不到
        assert!(registry.get_handler("task_history_cleanup").await.is_err());
        assert!(registry.get_handler("webhook_task").await.is_ok());
    }

    #[tokio::test]
    async fn queries_initialize_lazily() {
        let registry = HandlerRegistry::new();
        registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::HistoryCleanup)))
            .await
            .unwrap();

        assert!(registry.has_handler("task_history_cleanup").await.unwrap());
        assert!(!registry.has_handler("webhook_task").await.unwrap());
        assert_eq!(
            registry.get_all_task_types().await.unwrap(),
            vec!["task_history_cleanup"]
        );

        let late = registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook)))
            .await;
        assert!(matches!(late, Err(SchedulerError::Configuration(_))));
    }

    #[tokio::test]
    async fn concurrent_initialize_is_safe() {
        let registry = Arc::new(HandlerRegistry::new());
        registry
            .register(Arc::new(MockTaskHandler::succeeding(TaskKind::Webhook)))
            .await
            .unwrap();

        let (a, b, c) = tokio::join!(
            registry.initialize(),
            registry.initialize(),
            registry.initialize()
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(registry.get_all_task_types().await.unwrap().len(), 1);
    }
}
