//! SQLite row mapping helpers
//!
//! Timestamps are stored as Unix milliseconds (INTEGER) and JSON payloads as TEXT.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use taskq_core::{SchedulerError, SchedulerResult};

/// Helper functions for parsing SQLite columns
pub struct MappingHelpers;

impl MappingHelpers {
    pub fn to_millis(ts: DateTime<Utc>) -> i64 {
        ts.timestamp_millis()
    }

    pub fn opt_to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
        ts.map(Self::to_millis)
    }

    pub fn from_millis(ms: i64) -> SchedulerResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| SchedulerError::Serialization(format!("无效的时间戳: {ms}")))
    }

    pub fn get_datetime(row: &SqliteRow, field: &str) -> SchedulerResult<DateTime<Utc>> {
        let ms: i64 = row.try_get(field)?;
        Self::from_millis(ms)
    }

    pub fn get_opt_datetime(row: &SqliteRow, field: &str) -> SchedulerResult<Option<DateTime<Utc>>> {
        let ms: Option<i64> = row.try_get(field)?;
        ms.map(Self::from_millis).transpose()
    }

    /// Parse a JSON TEXT column, falling back to a plain string value for non-JSON text
    pub fn get_json(row: &SqliteRow, field: &str) -> SchedulerResult<Value> {
        let text: String = row.try_get(field)?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    pub fn get_opt_json(row: &SqliteRow, field: &str) -> SchedulerResult<Option<Value>> {
        let text: Option<String> = row.try_get(field)?;
        Ok(text.map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t))))
    }

    /// Parse an enum stored as TEXT
    pub fn get_parsed<T>(row: &SqliteRow, field: &str) -> SchedulerResult<T>
    where
        T: std::str::FromStr<Err = SchedulerError>,
    {
        let text: String = row.try_get(field)?;
        text.parse()
    }

    pub fn get_opt_parsed<T>(row: &SqliteRow, field: &str) -> SchedulerResult<Option<T>>
    where
        T: std::str::FromStr<Err = SchedulerError>,
    {
        let text: Option<String> = row.try_get(field)?;
        text.map(|t| t.parse()).transpose()
    }

    pub fn json_text(value: &Value) -> SchedulerResult<String> {
        Ok(serde_json::to_string(value)?)
    }
}
