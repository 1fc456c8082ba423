use std::collections::HashMap;

use crate::models::TaskKind;

/// 按任务类型选择目标队列
///
/// 查找顺序：配置中的显式路由、内置任务类型的默认队列、默认队列。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRouting {
    routes: HashMap<String, String>,
    default_queue: String,
}

impl QueueRouting {
    pub fn new(routes: HashMap<String, String>, default_queue: impl Into<String>) -> Self {
        Self {
            routes,
            default_queue: default_queue.into(),
        }
    }

    pub fn resolve(&self, task_type: &str) -> String {
        if let Some(queue) = self.routes.get(task_type) {
            return queue.clone();
        }
        match task_type.parse::<TaskKind>() {
            Ok(kind) => builtin_queue(kind).to_string(),
            Err(_) => self.default_queue.clone(),
        }
    }

    pub fn default_queue(&self) -> &str {
        &self.default_queue
    }
}

impl Default for QueueRouting {
    fn default() -> Self {
        Self::new(HashMap::new(), "default")
    }
}

/// 内置任务类型的默认队列
pub fn builtin_queue(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::EmailNotification => "mail_queue",
        TaskKind::Webhook => "webhook_queue",
        TaskKind::HistoryCleanup => "system_queue",
    }
}
