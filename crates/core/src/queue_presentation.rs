//! 队列展示信息
//!
//! 根据队列键推导人类可读名称、分类与颜色，供命令行和实时事件使用。
//! 所有函数都是纯函数，同一个键总是得到同样的结果。

use serde::{Deserialize, Serialize};

/// 队列分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueCategory {
    Mail,
    Notification,
    Webhook,
    System,
    Media,
    Data,
    General,
}

impl QueueCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueCategory::Mail => "mail",
            QueueCategory::Notification => "notification",
            QueueCategory::Webhook => "webhook",
            QueueCategory::System => "system",
            QueueCategory::Media => "media",
            QueueCategory::Data => "data",
            QueueCategory::General => "general",
        }
    }

    /// 分类对应的十六进制颜色
    pub fn color(&self) -> &'static str {
        match self {
            QueueCategory::Mail => "#3b82f6",
            QueueCategory::Notification => "#8b5cf6",
            QueueCategory::Webhook => "#f59e0b",
            QueueCategory::System => "#6b7280",
            QueueCategory::Media => "#ec4899",
            QueueCategory::Data => "#10b981",
            QueueCategory::General => "#64748b",
        }
    }
}

struct KnownQueue {
    key: &'static str,
    name: &'static str,
    category: QueueCategory,
}

const KNOWN_QUEUES: &[KnownQueue] = &[
    KnownQueue {
        key: "default",
        name: "Default",
        category: QueueCategory::General,
    },
    KnownQueue {
        key: "mail_queue",
        name: "Mail Queue",
        category: QueueCategory::Mail,
    },
    KnownQueue {
        key: "notification_queue",
        name: "Notifications",
        category: QueueCategory::Notification,
    },
    KnownQueue {
        key: "webhook_queue",
        name: "Webhooks",
        category: QueueCategory::Webhook,
    },
    KnownQueue {
        key: "system_queue",
        name: "System Tasks",
        category: QueueCategory::System,
    },
    KnownQueue {
        key: "media_queue",
        name: "Media Processing",
        category: QueueCategory::Media,
    },
    KnownQueue {
        key: "export_queue",
        name: "Data Exports",
        category: QueueCategory::Data,
    },
];

const CATEGORY_KEYWORDS: &[(&str, QueueCategory)] = &[
    ("mail", QueueCategory::Mail),
    ("notif", QueueCategory::Notification),
    ("hook", QueueCategory::Webhook),
    ("system", QueueCategory::System),
    ("cleanup", QueueCategory::System),
    ("maintenance", QueueCategory::System),
    ("image", QueueCategory::Media),
    ("media", QueueCategory::Media),
    ("video", QueueCategory::Media),
    ("export", QueueCategory::Data),
    ("import", QueueCategory::Data),
    ("report", QueueCategory::Data),
];

/// 一个队列键的完整展示信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePresentation {
    pub key: String,
    pub name: String,
    pub category: QueueCategory,
    pub color: String,
    pub recognized: bool,
}

/// 去掉命名空间前缀，`taskq:mail_queue` 与 `mail_queue` 视为同一队列
pub fn normalize_queue_key(key: &str) -> &str {
    key.rsplit(':').next().unwrap_or(key)
}

fn lookup(key: &str) -> Option<&'static KnownQueue> {
    let key = normalize_queue_key(key);
    KNOWN_QUEUES.iter().find(|known| known.key == key)
}

/// 人类可读名称：已知队列使用固定名称，否则转为标题格式
pub fn queue_display_name(key: &str) -> String {
    if let Some(known) = lookup(key) {
        return known.name.to_string();
    }
    title_case(normalize_queue_key(key))
}

pub fn queue_category(key: &str) -> QueueCategory {
    if let Some(known) = lookup(key) {
        return known.category;
    }
    let lowered = normalize_queue_key(key).to_ascii_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, category)| *category)
        .unwrap_or(QueueCategory::General)
}

pub fn queue_color(key: &str) -> &'static str {
    queue_category(key).color()
}

/// 是否为已知队列
pub fn is_recognized_queue(key: &str) -> bool {
    lookup(key).is_some()
}

pub fn describe_queue(key: &str) -> QueuePresentation {
    let category = queue_category(key);
    QueuePresentation {
        key: normalize_queue_key(key).to_string(),
        name: queue_display_name(key),
        category,
        color: category.color().to_string(),
        recognized: is_recognized_queue(key),
    }
}

fn title_case(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
