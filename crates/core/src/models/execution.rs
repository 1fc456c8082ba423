use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已加载角色的用户身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    pub roles: Vec<String>,
}

impl UserIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// 任务执行身份
///
/// 负载中带有 `created_by` 且用户存在时以该用户身份执行，否则以系统身份执行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExecutionIdentity {
    System,
    User(UserIdentity),
}

impl ExecutionIdentity {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            ExecutionIdentity::System => None,
            ExecutionIdentity::User(user) => Some(user.id),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            ExecutionIdentity::System => "system",
            ExecutionIdentity::User(user) => &user.username,
        }
    }
}

/// 执行上下文
///
/// 显式传递给处理器，不依赖任何全局状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub identity: ExecutionIdentity,
    pub task_id: String,
    pub task_type: String,
    pub queue: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub definition_id: Option<i64>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// 以系统身份构造上下文，主要用于处理器单独调用的场景
    pub fn system(task_type: &str, queue: &str) -> Self {
        Self {
            identity: ExecutionIdentity::System,
            task_id: uuid::Uuid::new_v4().to_string(),
            task_type: task_type.to_string(),
            queue: queue.to_string(),
            attempt: 1,
            max_attempts: 1,
            definition_id: None,
            started_at: Utc::now(),
        }
    }
}
