//! Redis 队列驱动
//!
//! 每个队列是一个有序集合，成员为带时间前缀的任务JSON。认领由一个 Lua 脚本完成：
//! `ZPOPMIN` 取出成员后在同一脚本内写入 `:active` 哈希（无法执行的写入 `:failed` 列表），
//! 任务不会同时从两处消失。带超时的认领按固定间隔轮询该脚本直到超时。键布局见 [`keys`]。
//!
//! 发现队列时会遇到其他进程写入的列表、集合或流，这些结构只参与计数与列表展示，
//! 其条目会被规范化为 [`QueueTask`]。

pub mod connection_manager;
pub mod keys;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::streams::StreamRangeReply;
use serde_json::{Map, Value};
use taskq_core::models::{
    ListQueuesOptions, NewQueueTask, Pagination, QueueDriver, QueueInfo, QueueStats,
    QueueStructure, QueueTask, QueueTaskPage, QueueTaskStatus, TaskListQuery,
};
use taskq_core::{QueueAdapter, SchedulerError, SchedulerResult};
use tracing::{debug, instrument, warn};

pub use connection_manager::{redis_error, RedisConnectionManager};
pub use keys::{
    encode_member, is_queue_key_candidate, member_payload, queue_score, RedisKeys,
    AUXILIARY_KEY_SUFFIXES, ORDER_PREFIX_WIDTH,
};

use crate::observability::StructuredLogger;

/// 单次扫描返回的键数量提示
const SCAN_COUNT: usize = 200;
/// 一次 `pop_task` 中最多跳过的无效成员数
const MAX_POP_SKIPS: usize = 16;
/// 带超时认领时的轮询间隔
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 原子认领脚本
///
/// KEYS: 队列主键、`:active`、`:failed`；ARGV: 时间前缀宽度。
/// 返回 `nil` 或 `{结果, 任务JSON}`，结果为 `claimed` / `unreadable` / `exhausted`。
const CLAIM_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1], 1)
if #popped == 0 then
    return false
end
local member = popped[1]
local width = tonumber(ARGV[1])
local payload = member
if string.len(member) > width and string.match(string.sub(member, 1, width + 1), '^%d+|$') then
    payload = string.sub(member, width + 2)
end
local ok, task = pcall(cjson.decode, payload)
if not ok or type(task) ~= 'table' or type(task.id) ~= 'string' then
    redis.call('LPUSH', KEYS[3], payload)
    return {'unreadable', payload}
end
local attempts = tonumber(task.attempts) or 0
local max_attempts = tonumber(task.max_attempts) or 1
if attempts >= max_attempts then
    redis.call('LPUSH', KEYS[3], payload)
    return {'exhausted', payload}
end
redis.call('HSET', KEYS[2], task.id, payload)
return {'claimed', payload}
"#;

/// 认领脚本的单次结果
#[derive(Debug)]
enum ClaimOutcome {
    Claimed(String),
    Unreadable(String),
    Exhausted(String),
}

pub struct RedisQueueAdapter {
    connection: RedisConnectionManager,
    keys: RedisKeys,
    known_queues: Vec<String>,
}

impl RedisQueueAdapter {
    pub fn new(
        connection: RedisConnectionManager,
        key_prefix: impl Into<String>,
        known_queues: Vec<String>,
    ) -> Self {
        Self {
            connection,
            keys: RedisKeys::new(key_prefix),
            known_queues,
        }
    }

    pub fn keys(&self) -> &RedisKeys {
        &self.keys
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.connection()
    }

    async fn key_structure(&self, key: &str) -> SchedulerResult<Option<QueueStructure>> {
        let mut conn = self.conn();
        let key_type: String = redis::cmd("TYPE")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("TYPE", e))?;

        Ok(match key_type.as_str() {
            "zset" => Some(QueueStructure::ZSet),
            "list" => Some(QueueStructure::List),
            "set" => Some(QueueStructure::Set),
            "stream" => Some(QueueStructure::Stream),
            _ => None,
        })
    }

    async fn count_entries(&self, key: &str, structure: QueueStructure) -> SchedulerResult<u64> {
        let command = match structure {
            QueueStructure::ZSet | QueueStructure::Table => "ZCARD",
            QueueStructure::List => "LLEN",
            QueueStructure::Set => "SCARD",
            QueueStructure::Stream => "XLEN",
        };
        let mut conn = self.conn();
        let count: u64 = redis::cmd(command)
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error(command, e))?;
        Ok(count)
    }

    /// 扫描命名空间，返回队列名及其数据结构
    async fn discover_queues(&self) -> SchedulerResult<BTreeMap<String, QueueStructure>> {
        let mut conn = self.conn();
        let pattern = self.keys.scan_pattern();
        let mut cursor: u64 = 0;
        let mut candidates = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("SCAN", e))?;

            candidates.extend(
                batch
                    .into_iter()
                    .filter(|key| is_queue_key_candidate(key, self.keys.prefix())),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        let mut queues = BTreeMap::new();
        for key in candidates {
            let Some(name) = self.keys.queue_name(&key) else {
                continue;
            };
            if let Some(structure) = self.key_structure(&key).await? {
                queues.insert(name.to_string(), structure);
            }
        }
        Ok(queues)
    }

    async fn structure_or_default(&self, queue: &str) -> SchedulerResult<QueueStructure> {
        Ok(self
            .key_structure(&self.keys.queue(queue))
            .await?
            .unwrap_or(QueueStructure::ZSet))
    }

    /// 读取主键中 `[start, stop]` 区间的原始条目
    async fn read_entries(
        &self,
        queue: &str,
        structure: QueueStructure,
        start: u64,
        stop: u64,
    ) -> SchedulerResult<Vec<(String, String)>> {
        let key = self.keys.queue(queue);
        let mut conn = self.conn();

        let indexed = |items: Vec<String>, offset: u64| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, raw)| (format!("{queue}:{}", offset + i as u64), raw))
                .collect::<Vec<_>>()
        };

        match structure {
            QueueStructure::ZSet | QueueStructure::Table => {
                let items: Vec<String> = redis::cmd("ZRANGE")
                    .arg(&key)
                    .arg(start)
                    .arg(stop)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| redis_error("ZRANGE", e))?;
                let payloads = items
                    .iter()
                    .map(|member| member_payload(member).to_string())
                    .collect();
                Ok(indexed(payloads, start))
            }
            QueueStructure::List => {
                let items: Vec<String> = redis::cmd("LRANGE")
                    .arg(&key)
                    .arg(start)
                    .arg(stop)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| redis_error("LRANGE", e))?;
                Ok(indexed(items, start))
            }
            QueueStructure::Set => {
                let mut items: Vec<String> = redis::cmd("SMEMBERS")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| redis_error("SMEMBERS", e))?;
                items.sort();
                let page = items
                    .into_iter()
                    .skip(start as usize)
                    .take((stop.saturating_sub(start) + 1) as usize)
                    .collect();
                Ok(indexed(page, start))
            }
            QueueStructure::Stream => {
                let reply: StreamRangeReply = redis::cmd("XRANGE")
                    .arg(&key)
                    .arg("-")
                    .arg("+")
                    .arg("COUNT")
                    .arg(stop + 1)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| redis_error("XRANGE", e))?;

                Ok(reply
                    .ids
                    .into_iter()
                    .skip(start as usize)
                    .map(|entry| {
                        let mut fields = Map::new();
                        for (field, value) in entry.map {
                            let text: String = redis::from_redis_value(&value).unwrap_or_default();
                            fields.insert(field, Value::String(text));
                        }
                        (entry.id, Value::Object(fields).to_string())
                    })
                    .collect())
            }
        }
    }

    async fn active_tasks(&self, queue: &str) -> SchedulerResult<Vec<QueueTask>> {
        let mut conn = self.conn();
        let values: Vec<String> = redis::cmd("HVALS")
            .arg(self.keys.active(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("HVALS", e))?;

        Ok(values
            .iter()
            .enumerate()
            .map(|(i, raw)| normalize_entry(raw, queue, &format!("{queue}:active:{i}")))
            .collect())
    }

    async fn try_get_queue_length(&self, queue: &str) -> SchedulerResult<u64> {
        let key = self.keys.queue(queue);
        match self.key_structure(&key).await? {
            Some(structure) => self.count_entries(&key, structure).await,
            None => Ok(0),
        }
    }

    async fn try_get_queue_stats(&self, queue: &str) -> SchedulerResult<QueueStats> {
        let depth = self.try_get_queue_length(queue).await?;
        let mut conn = self.conn();

        let running: u64 = redis::cmd("HLEN")
            .arg(self.keys.active(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("HLEN", e))?;
        let failed: u64 = redis::cmd("LLEN")
            .arg(self.keys.failed(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("LLEN", e))?;
        let paused: bool = redis::cmd("EXISTS")
            .arg(self.keys.paused(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("EXISTS", e))?;

        Ok(QueueStats {
            queue: queue.to_string(),
            depth,
            running,
            failed,
            paused,
        })
    }

    async fn try_list_queues(&self, options: ListQueuesOptions) -> SchedulerResult<Vec<QueueInfo>> {
        let mut discovered = if options.include_discovered {
            self.discover_queues().await?
        } else {
            BTreeMap::new()
        };

        let mut queues = Vec::new();
        for name in &self.known_queues {
            let structure = match discovered.remove(name) {
                Some(structure) => structure,
                None => self.structure_or_default(name).await?,
            };
            let stats = self.try_get_queue_stats(name).await?;
            queues.push(QueueInfo::describe(
                name,
                QueueDriver::Redis,
                structure,
                stats,
                true,
            ));
        }

        for (name, structure) in discovered {
            let stats = self.try_get_queue_stats(&name).await?;
            queues.push(QueueInfo::describe(
                &name,
                QueueDriver::Redis,
                structure,
                stats,
                false,
            ));
        }

        Ok(queues)
    }

    async fn try_get_queue_tasks(&self, queue: &str, page: Pagination) -> SchedulerResult<QueueTaskPage> {
        let key = self.keys.queue(queue);
        let Some(structure) = self.key_structure(&key).await? else {
            return Ok(QueueTaskPage::empty(queue, page));
        };
        if page.limit == 0 {
            let total = self.count_entries(&key, structure).await?;
            return Ok(QueueTaskPage::new(queue, Vec::new(), total, page));
        }

        let total = self.count_entries(&key, structure).await?;
        let start = u64::from(page.offset);
        let stop = start + u64::from(page.limit) - 1;
        let tasks = self
            .read_entries(queue, structure, start, stop)
            .await?
            .iter()
            .map(|(fallback_id, raw)| normalize_entry(raw, queue, fallback_id))
            .collect();

        Ok(QueueTaskPage::new(queue, tasks, total, page))
    }

    async fn try_get_all_tasks(&self, query: &TaskListQuery) -> SchedulerResult<Vec<QueueTask>> {
        let mut queues = self.discover_queues().await?;
        for name in &self.known_queues {
            queues.entry(name.clone()).or_insert(QueueStructure::ZSet);
        }

        let mut tasks = Vec::new();
        for (queue, structure) in &queues {
            if query.status != Some(QueueTaskStatus::Processing) {
                let count = self.count_entries(&self.keys.queue(queue), *structure).await?;
                if count > 0 {
                    tasks.extend(
                        self.read_entries(queue, *structure, 0, count - 1)
                            .await?
                            .iter()
                            .map(|(fallback_id, raw)| normalize_entry(raw, queue, fallback_id)),
                    );
                }
            }
            if query.status != Some(QueueTaskStatus::Pending) {
                tasks.extend(self.active_tasks(queue).await?);
            }
        }

        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(tasks
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect())
    }

    /// 执行一次认领脚本
    async fn claim_once(&self, queue: &str) -> SchedulerResult<Option<ClaimOutcome>> {
        let mut conn = self.conn();
        let reply: Option<(String, String)> = redis::Script::new(CLAIM_SCRIPT)
            .key(self.keys.queue(queue))
            .key(self.keys.active(queue))
            .key(self.keys.failed(queue))
            .arg(ORDER_PREFIX_WIDTH)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("EVALSHA", e))?;

        match reply {
            None => Ok(None),
            Some((kind, payload)) => match kind.as_str() {
                "claimed" => Ok(Some(ClaimOutcome::Claimed(payload))),
                "exhausted" => Ok(Some(ClaimOutcome::Exhausted(payload))),
                "unreadable" => Ok(Some(ClaimOutcome::Unreadable(payload))),
                other => Err(SchedulerError::MessageQueue(format!(
                    "未知的认领结果: {other}"
                ))),
            },
        }
    }

    /// 认领一个成员，带超时时轮询到截止时间
    async fn claim_member(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Option<ClaimOutcome>> {
        let Some(timeout) = timeout else {
            return self.claim_once(queue).await;
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.claim_once(queue).await? {
                return Ok(Some(outcome));
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(CLAIM_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn remove_active(&self, queue: &str, id: &str) -> SchedulerResult<u64> {
        let mut conn = self.conn();
        redis::cmd("HDEL")
            .arg(self.keys.active(queue))
            .arg(id)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("HDEL", e))
    }

    async fn push_failed(&self, queue: &str, raw: &str) -> SchedulerResult<()> {
        let mut conn = self.conn();
        redis::cmd("LPUSH")
            .arg(self.keys.failed(queue))
            .arg(raw)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("LPUSH", e))?;
        Ok(())
    }

    async fn remove_from_queue(&self, queue: &str, id: &str) -> SchedulerResult<bool> {
        let removed_active = self.remove_active(queue, id).await?;
        let mut conn = self.conn();

        let key = self.keys.queue(queue);
        if self.key_structure(&key).await? != Some(QueueStructure::ZSet) {
            return Ok(removed_active > 0);
        }

        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(&key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("ZRANGE", e))?;

        let mut removed_pending = 0u64;
        for member in members {
            let matches = serde_json::from_str::<QueueTask>(member_payload(&member))
                .map(|task| task.id == id)
                .unwrap_or(false);
            if matches {
                removed_pending += redis::cmd("ZREM")
                    .arg(&key)
                    .arg(&member)
                    .query_async::<u64>(&mut conn)
                    .await
                    .map_err(|e| redis_error("ZREM", e))?;
            }
        }

        Ok(removed_active + removed_pending > 0)
    }

    async fn clear_single(&self, queue: &str) -> SchedulerResult<u64> {
        let pending = self.try_get_queue_length(queue).await?;
        let mut conn = self.conn();
        let running: u64 = redis::cmd("HLEN")
            .arg(self.keys.active(queue))
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("HLEN", e))?;

        redis::cmd("DEL")
            .arg(self.keys.queue(queue))
            .arg(self.keys.active(queue))
            .arg(self.keys.failed(queue))
            .query_async::<u64>(&mut conn)
            .await
            .map_err(|e| redis_error("DEL", e))?;

        Ok(pending + running)
    }
}

#[async_trait]
impl QueueAdapter for RedisQueueAdapter {
    fn driver(&self) -> QueueDriver {
        QueueDriver::Redis
    }

    #[instrument(skip(self, task), fields(queue = %queue, task_type = %task.task_type))]
    async fn add_task(&self, queue: &str, task: NewQueueTask) -> SchedulerResult<QueueTask> {
        if queue.trim().is_empty() || queue.contains(':') {
            return Err(SchedulerError::InvalidTaskParams(format!(
                "无效的队列名称: '{queue}'"
            )));
        }

        let task = task.into_queue_task(queue, Utc::now());
        let member = encode_member(task.created_at, &serde_json::to_string(&task)?);
        let mut conn = self.conn();
        redis::cmd("ZADD")
            .arg(self.keys.queue(queue))
            .arg(queue_score(task.priority))
            .arg(member)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| redis_error("ZADD", e))?;

        StructuredLogger::log_task_enqueued(&task.id, queue, &task.task_type, task.priority);
        Ok(task)
    }

    async fn pop_task(
        &self,
        queue: &str,
        timeout: Option<Duration>,
    ) -> SchedulerResult<Option<QueueTask>> {
        for _ in 0..MAX_POP_SKIPS {
            let payload = match self.claim_member(queue, timeout).await? {
                None => return Ok(None),
                Some(ClaimOutcome::Claimed(payload)) => payload,
                Some(ClaimOutcome::Unreadable(payload)) => {
                    warn!(
                        "Moved unreadable member of queue {} to failed list: {}",
                        queue, payload
                    );
                    continue;
                }
                Some(ClaimOutcome::Exhausted(payload)) => {
                    warn!(
                        "Moved task with no attempts left from queue {} to failed list: {}",
                        queue, payload
                    );
                    continue;
                }
            };

            let mut task = match serde_json::from_str::<QueueTask>(&payload) {
                Ok(task) => task,
                Err(e) => {
                    warn!("Moving unreadable member of queue {} to failed list: {}", queue, e);
                    let id = serde_json::from_str::<Value>(&payload)
                        .ok()
                        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
                    if let Some(id) = id {
                        self.remove_active(queue, &id).await?;
                    }
                    self.push_failed(queue, &payload).await?;
                    continue;
                }
            };

            let now = Utc::now();
            task.status = QueueTaskStatus::Processing;
            task.attempts += 1;
            task.updated_at = now;
            task.processed_at = Some(now);

            let mut conn = self.conn();
            redis::cmd("HSET")
                .arg(self.keys.active(queue))
                .arg(&task.id)
                .arg(serde_json::to_string(&task)?)
                .query_async::<i64>(&mut conn)
                .await
                .map_err(|e| redis_error("HSET", e))?;

            debug!("Popped task {} from queue {}", task.id, queue);
            return Ok(Some(task));
        }

        Ok(None)
    }

    async fn get_queue_length(&self, queue: &str) -> u64 {
        match self.try_get_queue_length(queue).await {
            Ok(length) => length,
            Err(e) => {
                StructuredLogger::log_queue_degraded("redis", "get_queue_length", queue, &e);
                0
            }
        }
    }

    async fn get_all_tasks(&self, query: TaskListQuery) -> Vec<QueueTask> {
        match self.try_get_all_tasks(&query).await {
            Ok(tasks) => tasks,
            Err(e) => {
                StructuredLogger::log_queue_degraded("redis", "get_all_tasks", "*", &e);
                Vec::new()
            }
        }
    }

    async fn delete_task(&self, id: &str) -> SchedulerResult<bool> {
        let mut queues: Vec<String> = self.discover_queues().await?.into_keys().collect();
        for name in &self.known_queues {
            if !queues.contains(name) {
                queues.push(name.clone());
            }
        }

        let mut removed = false;
        for queue in &queues {
            removed |= self.remove_from_queue(queue, id).await?;
        }
        Ok(removed)
    }

    async fn clear_queue(&self, queue: Option<&str>) -> SchedulerResult<u64> {
        match queue {
            Some(queue) => self.clear_single(queue).await,
            None => {
                let mut total = 0;
                for queue in self.discover_queues().await?.keys() {
                    total += self.clear_single(queue).await?;
                }
                Ok(total)
            }
        }
    }

    async fn list_queues(&self, options: ListQueuesOptions) -> Vec<QueueInfo> {
        match self.try_list_queues(options).await {
            Ok(queues) => queues,
            Err(e) => {
                StructuredLogger::log_queue_degraded("redis", "list_queues", "*", &e);
                Vec::new()
            }
        }
    }

    async fn get_queue_tasks(&self, queue: &str, page: Pagination) -> QueueTaskPage {
        match self.try_get_queue_tasks(queue, page).await {
            Ok(page) => page,
            Err(e) => {
                StructuredLogger::log_queue_degraded("redis", "get_queue_tasks", queue, &e);
                QueueTaskPage::empty(queue, page)
            }
        }
    }

    async fn get_queue_stats(&self, queue: &str) -> QueueStats {
        match self.try_get_queue_stats(queue).await {
            Ok(stats) => stats,
            Err(e) => {
                StructuredLogger::log_queue_degraded("redis", "get_queue_stats", queue, &e);
                QueueStats::empty(queue)
            }
        }
    }
}

/// 把任意条目规范化为队列任务
///
/// 本驱动写入的成员直接反序列化；其他来源的 JSON 条目保留在 `data` 中，
/// 非 JSON 文本作为字符串保留。
pub fn normalize_entry(raw: &str, queue: &str, fallback_id: &str) -> QueueTask {
    if let Ok(task) = serde_json::from_str::<QueueTask>(raw) {
        return task;
    }

    let data = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let text_field = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| data.get(*name).and_then(Value::as_str))
            .map(str::to_string)
    };
    let int_field = |names: &[&str]| {
        names.iter().find_map(|name| {
            data.get(*name).and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.parse::<i64>().ok()))
            })
        })
    };

    let task_type = text_field(&["task_type", "type", "name"]).unwrap_or_else(|| "unknown".to_string());
    let created_at = int_field(&["timestamp", "created_at"])
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default();

    QueueTask {
        id: text_field(&["id"]).unwrap_or_else(|| fallback_id.to_string()),
        queue: queue.to_string(),
        name: text_field(&["name"]).unwrap_or_else(|| task_type.clone()),
        task_type,
        priority: int_field(&["priority"]).unwrap_or(0) as i32,
        status: QueueTaskStatus::Pending,
        attempts: int_field(&["attempts", "attemptsMade"]).unwrap_or(0) as i32,
        max_attempts: int_field(&["max_attempts", "attempts_limit"]).unwrap_or(1) as i32,
        error: text_field(&["error", "failedReason"]),
        created_at,
        updated_at: created_at,
        processed_at: None,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn own_members_deserialize_directly() {
        let task = NewQueueTask::new("webhook_task", json!({"url": "https://example.com"}))
            .with_priority(4)
            .into_queue_task("webhook_queue", Utc::now());
        let raw = serde_json::to_string(&task).unwrap();
        assert_eq!(normalize_entry(&raw, "webhook_queue", "x"), task);
    }

    #[test]
    fn foreign_json_entries_are_normalized() {
        let raw = r#"{"type":"resize","priority":"2","timestamp":1700000000000}"#;
        let task = normalize_entry(raw, "media_queue", "media_queue:0");
        assert_eq!(task.id, "media_queue:0");
        assert_eq!(task.task_type, "resize");
        assert_eq!(task.priority, 2);
        assert_eq!(task.created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(task.data["type"], "resize");
    }

    #[test]
    fn plain_text_entries_keep_their_text() {
        let task = normalize_entry("hello", "legacy", "legacy:3");
        assert_eq!(task.data, Value::String("hello".into()));
        assert_eq!(task.task_type, "unknown");
    }
}
