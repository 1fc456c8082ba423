use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use taskq_core::models::{truncate_message, ExecutionContext, TaskKind};
use taskq_core::{FieldType, SchedulerError, SchedulerResult, SchemaField, TaskHandler, TaskSchema};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const MAX_RESPONSE_CHARS: usize = 2000;
const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Webhook 任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookParams {
    pub url: String,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    /// 字符串原样发送，其他JSON值按JSON发送
    pub body: Option<Value>,
    pub timeout_seconds: Option<u64>,
}

impl WebhookParams {
    fn method(&self) -> String {
        self.method
            .as_deref()
            .unwrap_or("POST")
            .to_uppercase()
    }
}

/// Webhook 处理器，非 2xx 响应视为执行失败
pub struct WebhookHandler {
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for WebhookHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_request(data: &Value) -> SchedulerResult<()> {
    let url = data["url"].as_str().unwrap_or_default();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(SchedulerError::InvalidTaskParams(format!(
            "Webhook地址必须以http://或https://开头: {url}"
        )));
    }
    if let Some(method) = data["method"].as_str() {
        if !SUPPORTED_METHODS.contains(&method.to_uppercase().as_str()) {
            return Err(SchedulerError::InvalidTaskParams(format!(
                "不支持的HTTP方法: {method}"
            )));
        }
    }
    if let Some(headers) = data["headers"].as_object() {
        if headers.values().any(|v| !v.is_string()) {
            return Err(SchedulerError::InvalidTaskParams(
                "请求头的值必须是字符串".to_string(),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl TaskHandler for WebhookHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Webhook
    }

    fn schema(&self) -> TaskSchema {
        TaskSchema::new(
            TaskKind::Webhook,
            vec![
                SchemaField::required("url", FieldType::String, "请求地址"),
                SchemaField::optional("method", FieldType::String, "HTTP方法，默认POST"),
                SchemaField::optional("headers", FieldType::Object, "请求头"),
                SchemaField::optional("body", FieldType::Any, "请求体"),
                SchemaField::optional("timeout_seconds", FieldType::Integer, "超时时间（秒）"),
            ],
        )
        .with_validator(validate_request)
    }

    async fn execute(&self, ctx: &ExecutionContext, data: &Value) -> SchedulerResult<Value> {
        let params: WebhookParams = serde_json::from_value(data.clone()).map_err(|e| {
            SchedulerError::InvalidTaskParams(format!("解析Webhook参数失败: {e}"))
        })?;
        let method = params.method();

        info!(
            "执行Webhook任务: task_id={}, method={}, url={}",
            ctx.task_id, method, params.url
        );

        let mut request = match method.as_str() {
            "GET" => self.client.get(&params.url),
            "POST" => self.client.post(&params.url),
            "PUT" => self.client.put(&params.url),
            "PATCH" => self.client.patch(&params.url),
            "DELETE" => self.client.delete(&params.url),
            "HEAD" => self.client.head(&params.url),
            _ => {
                return Err(SchedulerError::InvalidTaskParams(format!(
                    "不支持的HTTP方法: {method}"
                )));
            }
        };

        request = request.timeout(Duration::from_secs(
            params.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        ));
        for (key, value) in params.headers.iter().flatten() {
            request = request.header(key, value);
        }
        match &params.body {
            Some(Value::String(text)) => request = request.body(text.clone()),
            Some(Value::Null) | None => {}
            Some(body) => request = request.json(body),
        }

        let response = request.send().await.map_err(|e| {
            error!("Webhook请求失败: task_id={}, error={}", ctx.task_id, e);
            SchedulerError::TaskExecution(format!("Webhook请求失败: {e}"))
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("读取响应体失败: {e}"));

        if !status.is_success() {
            return Err(SchedulerError::TaskExecution(format!(
                "Webhook返回非成功状态码 {}: {}",
                status.as_u16(),
                truncate_message(&body, 200)
            )));
        }

        Ok(json!({
            "status": status.as_u16(),
            "body": truncate_message(&body, MAX_RESPONSE_CHARS),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_url_and_method() {
        let handler = WebhookHandler::new();
        assert!(handler.validate(&json!({"url": "https://example.com"})).is_ok());
        assert!(handler
            .validate(&json!({"url": "https://example.com", "method": "get"}))
            .is_ok());
        assert!(handler.validate(&json!({"url": "ftp://example.com"})).is_err());
        assert!(handler
            .validate(&json!({"url": "https://example.com", "method": "TRACE"}))
            .is_err());
        assert!(handler
            .validate(&json!({"url": "https://example.com", "headers": {"X-Retry": 1}}))
            .is_err());
        assert!(handler.validate(&json!({})).is_err());
    }

    #[test]
    fn method_defaults_to_post() {
        let params: WebhookParams =
            serde_json::from_value(json!({"url": "https://example.com"})).unwrap();
        assert_eq!(params.method(), "POST");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_execution_error() {
        let handler = WebhookHandler::new();
        let err = handler
            .execute(
                &ExecutionContext::system("webhook_task", "webhook_queue"),
                &json!({"url": "http://127.0.0.1:1/hook", "timeout_seconds": 2}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TaskExecution(_)));
    }
}
