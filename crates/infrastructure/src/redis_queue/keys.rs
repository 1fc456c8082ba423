//! Redis 键布局
//!
//! - `<prefix>:<queue>` 有序集合，成员见 [`encode_member`]，分值见 [`queue_score`]
//! - `<prefix>:<queue>:active` 哈希，处理中的任务
//! - `<prefix>:<queue>:failed` 列表，无法执行的任务
//! - `<prefix>:<queue>:paused` 标记，存在即暂停

use chrono::{DateTime, Utc};

/// 辅助键后缀，发现队列时排除
pub const AUXILIARY_KEY_SUFFIXES: &[&str] = &[
    "failed",
    "paused",
    "worker",
    "workers",
    "lock",
    "errors",
    "heartbeat",
    "last_activity",
    "active",
    "completed",
    "stats",
    "meta",
    "events",
];

/// 成员前缀中时间戳的位数
pub const ORDER_PREFIX_WIDTH: usize = 20;
/// 前缀与任务JSON之间的分隔符
const ORDER_PREFIX_SEPARATOR: char = '|';

/// 有序集合分值：优先级越高越小
///
/// 分值只承载优先级，任意 `i32` 都能在 `f64` 中精确表示。同分值成员按字节序排列，
/// 同优先级的先后由 [`encode_member`] 写入的时间前缀决定。
pub fn queue_score(priority: i32) -> f64 {
    -f64::from(priority)
}

/// 编码有序集合成员：定宽的创建时间（微秒）前缀加任务JSON
pub fn encode_member(created_at: DateTime<Utc>, task_json: &str) -> String {
    let micros = created_at.timestamp_micros().max(0);
    format!(
        "{:0width$}{}{}",
        micros,
        ORDER_PREFIX_SEPARATOR,
        task_json,
        width = ORDER_PREFIX_WIDTH
    )
}

/// 取出成员中的任务JSON，没有时间前缀的外部条目原样返回
pub fn member_payload(member: &str) -> &str {
    let bytes = member.as_bytes();
    let has_prefix = bytes.len() > ORDER_PREFIX_WIDTH
        && bytes[..ORDER_PREFIX_WIDTH].iter().all(u8::is_ascii_digit)
        && bytes[ORDER_PREFIX_WIDTH] == ORDER_PREFIX_SEPARATOR as u8;
    if has_prefix {
        &member[ORDER_PREFIX_WIDTH + 1..]
    } else {
        member
    }
}

/// 判断一个键是否可能是队列主键
///
/// 键必须位于 `<prefix>:` 命名空间下，剩余部分非空、不含更深的层级，
/// 也不能以任何辅助后缀结尾。
pub fn is_queue_key_candidate(key: &str, prefix: &str) -> bool {
    let Some(rest) = key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(':'))
    else {
        return false;
    };

    if rest.is_empty() {
        return false;
    }

    let has_auxiliary_suffix = AUXILIARY_KEY_SUFFIXES.iter().any(|suffix| {
        rest == *suffix
            || rest
                .strip_suffix(suffix)
                .is_some_and(|head| head.ends_with(':'))
    });

    !has_auxiliary_suffix && !rest.contains(':')
}

/// 键生成器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisKeys {
    prefix: String,
}

impl RedisKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn queue(&self, queue: &str) -> String {
        format!("{}:{}", self.prefix, queue)
    }

    pub fn active(&self, queue: &str) -> String {
        format!("{}:{}:active", self.prefix, queue)
    }

    pub fn failed(&self, queue: &str) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    pub fn paused(&self, queue: &str) -> String {
        format!("{}:{}:paused", self.prefix, queue)
    }

    pub fn scan_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    /// 从队列主键取回队列名，非队列键返回 `None`
    pub fn queue_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        if !is_queue_key_candidate(key, &self.prefix) {
            return None;
        }
        key.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn auxiliary_keys_are_never_queues() {
        for suffix in AUXILIARY_KEY_SUFFIXES {
            let key = format!("taskq:mail_queue:{suffix}");
            assert!(!is_queue_key_candidate(&key, "taskq"), "{key}");
        }
        assert!(!is_queue_key_candidate("taskq:failed", "taskq"));
        assert!(!is_queue_key_candidate("taskq:heartbeat", "taskq"));
    }

    #[test]
    fn plain_queue_keys_are_candidates() {
        assert!(is_queue_key_candidate("taskq:mail_queue", "taskq"));
        assert!(is_queue_key_candidate("taskq:failed_payments", "taskq"));
        assert!(!is_queue_key_candidate("other:mail_queue", "taskq"));
        assert!(!is_queue_key_candidate("taskq:", "taskq"));
        assert!(!is_queue_key_candidate("taskqx:mail_queue", "taskq"));
        assert!(!is_queue_key_candidate("taskq:a:b", "taskq"));
    }

    #[test]
    fn keys_follow_layout() {
        let keys = RedisKeys::new("taskq");
        assert_eq!(keys.queue("mail_queue"), "taskq:mail_queue");
        assert_eq!(keys.active("mail_queue"), "taskq:mail_queue:active");
        assert_eq!(keys.failed("mail_queue"), "taskq:mail_queue:failed");
        assert_eq!(keys.paused("mail_queue"), "taskq:mail_queue:paused");
        assert_eq!(keys.queue_name("taskq:mail_queue"), Some("mail_queue"));
        assert_eq!(keys.queue_name("taskq:mail_queue:active"), None);
    }

    /// 按 Redis 的规则排序：分值升序，同分值按成员字节序
    fn redis_order(entries: &mut [(f64, String)]) {
        entries.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.as_bytes().cmp(b.1.as_bytes())));
    }

    #[test]
    fn higher_priority_scores_lower() {
        assert!(queue_score(5) < queue_score(0));
        assert!(queue_score(i32::MAX) < queue_score(i32::MAX - 1));
        assert!(queue_score(i32::MIN + 1) < queue_score(i32::MIN));
    }

    #[test]
    fn equal_priority_stays_fifo_for_large_priorities() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(500);

        for priority in [0, 1_000_000, i32::MAX, i32::MIN] {
            // 后入队的任务ID字节序更小
            let mut entries = vec![
                (queue_score(priority), encode_member(t1, r#"{"id":"0000"}"#)),
                (queue_score(priority), encode_member(t0, r#"{"id":"ffff"}"#)),
            ];
            redis_order(&mut entries);
            assert_eq!(member_payload(&entries[0].1), r#"{"id":"ffff"}"#, "{priority}");
        }
    }

    #[test]
    fn priority_outranks_age() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::days(365);
        let mut entries = vec![
            (queue_score(1_000_000), encode_member(t0, r#"{"id":"low"}"#)),
            (queue_score(2_000_000), encode_member(t1, r#"{"id":"high"}"#)),
            (queue_score(-5), encode_member(t0, r#"{"id":"lowest"}"#)),
        ];
        redis_order(&mut entries);
        let order: Vec<_> = entries.iter().map(|(_, m)| member_payload(m)).collect();
        assert_eq!(order, vec![r#"{"id":"high"}"#, r#"{"id":"low"}"#, r#"{"id":"lowest"}"#]);
    }

    #[test]
    fn member_payload_strips_only_order_prefix() {
        let now = Utc::now();
        let json = r#"{"id":"a","queue":"mail_queue"}"#;
        let member = encode_member(now, json);
        assert_eq!(member.len(), json.len() + 21);
        assert_eq!(member_payload(&member), json);

        assert_eq!(member_payload(json), json);
        assert_eq!(member_payload("12345|short"), "12345|short");
        assert_eq!(member_payload("plain text"), "plain text");
    }
}
