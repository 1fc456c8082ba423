use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 内置任务类型
///
/// 处理器注册表以此为键，新增任务类型需要在这里增加变体。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "email_notification_task")]
    EmailNotification,
    #[serde(rename = "webhook_task")]
    Webhook,
    #[serde(rename = "task_history_cleanup")]
    HistoryCleanup,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [
        TaskKind::EmailNotification,
        TaskKind::Webhook,
        TaskKind::HistoryCleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::EmailNotification => "email_notification_task",
            TaskKind::Webhook => "webhook_task",
            TaskKind::HistoryCleanup => "task_history_cleanup",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}
