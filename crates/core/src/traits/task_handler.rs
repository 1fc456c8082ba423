//! 任务处理器接口
//!
//! 每个任务类型对应一个处理器。Worker 在执行前先调用 `validate`，
//! 通过后再以显式的 [`ExecutionContext`] 调用 `execute`。

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{ExecutionContext, TaskKind};
use crate::{SchedulerError, SchedulerResult};

/// 负载字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
            FieldType::Any => true,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Any => "any",
        }
    }
}

/// 负载字段描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub description: &'static str,
}

impl SchemaField {
    pub fn required(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self {
            name,
            field_type,
            required: true,
            description,
        }
    }

    pub fn optional(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self {
            name,
            field_type,
            required: false,
            description,
        }
    }
}

/// 额外的负载校验函数
pub type SchemaValidator = fn(&Value) -> SchedulerResult<()>;

/// 任务负载结构描述
#[derive(Debug, Clone)]
pub struct TaskSchema {
    pub task_type: TaskKind,
    pub fields: Vec<SchemaField>,
    pub validator: Option<SchemaValidator>,
}

impl TaskSchema {
    pub fn new(task_type: TaskKind, fields: Vec<SchemaField>) -> Self {
        Self {
            task_type,
            fields,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: SchemaValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// 检查负载为对象、必填字段存在且字段类型匹配，最后执行额外校验
    pub fn validate(&self, data: &Value) -> SchedulerResult<()> {
        let object = data.as_object().ok_or_else(|| {
            SchedulerError::InvalidTaskParams(format!(
                "{} 的负载必须是JSON对象",
                self.task_type
            ))
        })?;

        for field in &self.fields {
            match object.get(field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(SchedulerError::InvalidTaskParams(format!(
                        "{} 缺少必填字段: {}",
                        self.task_type, field.name
                    )));
                }
                Some(value) if !value.is_null() && !field.field_type.matches(value) => {
                    return Err(SchedulerError::InvalidTaskParams(format!(
                        "{} 字段 {} 应为 {} 类型",
                        self.task_type,
                        field.name,
                        field.field_type.as_str()
                    )));
                }
                _ => {}
            }
        }

        match self.validator {
            Some(validator) => validator(data),
            None => Ok(()),
        }
    }
}

/// 任务处理器抽象接口
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 处理器负责的任务类型
    fn kind(&self) -> TaskKind;

    fn schema(&self) -> TaskSchema;

    /// 执行前的负载校验，默认按 schema 校验
    fn validate(&self, data: &Value) -> SchedulerResult<()> {
        self.schema().validate(data)
    }

    /// 执行任务，返回结果写入执行历史
    async fn execute(&self, ctx: &ExecutionContext, data: &Value) -> SchedulerResult<Value>;

    /// 释放处理器持有的资源
    async fn cleanup(&self) -> SchedulerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> TaskSchema {
        TaskSchema::new(
            TaskKind::Webhook,
            vec![
                SchemaField::required("url", FieldType::String, "目标地址"),
                SchemaField::optional("headers", FieldType::Object, "请求头"),
            ],
        )
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(schema().validate(&json!("text")).is_err());
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = schema().validate(&json!({"headers": {}})).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn rejects_wrong_field_type() {
        assert!(schema()
            .validate(&json!({"url": "http://x", "headers": "nope"}))
            .is_err());
    }

    #[test]
    fn runs_extra_validator() {
        fn https_only(data: &Value) -> SchedulerResult<()> {
            match data["url"].as_str() {
                Some(url) if url.starts_with("https://") => Ok(()),
                _ => Err(SchedulerError::InvalidTaskParams("只允许https".into())),
            }
        }
        let schema = schema().with_validator(https_only);
        assert!(schema.validate(&json!({"url": "http://x"})).is_err());
        assert!(schema.validate(&json!({"url": "https://x"})).is_ok());
    }
}
