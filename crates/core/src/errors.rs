use thiserror::Error;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("任务定义未找到: {id}")]
    TaskDefinitionNotFound { id: i64 },

    #[error("队列任务未找到: {id}")]
    QueueTaskNotFound { id: String },

    #[error("未找到任务类型 '{}' 的处理器, 已注册类型: [{}]", .task_type, .known.join(", "))]
    HandlerNotFound {
        task_type: String,
        known: Vec<String>,
    },

    #[error("任务类型 '{0}' 的处理器重复注册")]
    DuplicateHandler(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("消息队列错误: {0}")]
    MessageQueue(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl SchedulerError {
    /// 是否为配置类错误（启动阶段遇到时应直接退出）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Configuration(_) | SchedulerError::DuplicateHandler(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_not_found_lists_known_types() {
        let err = SchedulerError::HandlerNotFound {
            task_type: "unknown".to_string(),
            known: vec!["email_notification_task".to_string(), "webhook_task".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("unknown"));
        assert!(message.contains("email_notification_task, webhook_task"));
    }

    #[test]
    fn configuration_errors_are_fatal() {
        assert!(SchedulerError::Configuration("x".into()).is_fatal());
        assert!(!SchedulerError::TaskExecution("x".into()).is_fatal());
    }
}
