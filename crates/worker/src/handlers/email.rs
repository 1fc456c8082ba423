use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use taskq_core::models::{ExecutionContext, OutgoingEmail, TaskKind};
use taskq_core::{
    EmailOutbox, FieldType, SchedulerError, SchedulerResult, SchemaField, TaskHandler, TaskSchema,
};

/// 邮件通知处理器
///
/// 只负责把邮件写入发件箱，实际投递由外部邮件服务完成。
pub struct EmailNotificationHandler {
    outbox: Arc<dyn EmailOutbox>,
}

impl EmailNotificationHandler {
    pub fn new(outbox: Arc<dyn EmailOutbox>) -> Self {
        Self { outbox }
    }
}

fn validate_recipient(data: &Value) -> SchedulerResult<()> {
    let to = data["to"].as_str().unwrap_or_default().trim();
    if to.is_empty() || !to.contains('@') {
        return Err(SchedulerError::InvalidTaskParams(format!(
            "无效的收件人地址: {to}"
        )));
    }
    if data["subject"].as_str().map_or(true, |s| s.trim().is_empty()) {
        return Err(SchedulerError::InvalidTaskParams("邮件主题不能为空".to_string()));
    }
    Ok(())
}

#[async_trait]
impl TaskHandler for EmailNotificationHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::EmailNotification
    }

    fn schema(&self) -> TaskSchema {
        TaskSchema::new(
            TaskKind::EmailNotification,
            vec![
                SchemaField::required("to", FieldType::String, "收件人地址"),
                SchemaField::required("subject", FieldType::String, "邮件主题"),
                SchemaField::required("body", FieldType::String, "邮件正文"),
            ],
        )
        .with_validator(validate_recipient)
    }

    async fn execute(&self, ctx: &ExecutionContext, data: &Value) -> SchedulerResult<Value> {
        let email = OutgoingEmail {
            recipient: data["to"].as_str().unwrap_or_default().trim().to_string(),
            subject: data["subject"].as_str().unwrap_or_default().to_string(),
            body: data["body"].as_str().unwrap_or_default().to_string(),
            created_by: ctx.identity.user_id(),
        };

        let outbox_id = self.outbox.stage(email.clone()).await?;
        info!(
            "邮件已写入发件箱: outbox_id={}, recipient={}, task_id={}",
            outbox_id, email.recipient, ctx.task_id
        );

        Ok(json!({
            "outbox_id": outbox_id,
            "recipient": email.recipient,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskq_testing_utils::TestDatabase;

    #[tokio::test]
    async fn stages_message_in_outbox() {
        let db = TestDatabase::new().await.unwrap();
        let handler = EmailNotificationHandler::new(db.outbox.clone());
        let data = json!({"to": "ops@example.com", "subject": "Daily", "body": "All green"});

        handler.validate(&data).unwrap();
        let result = handler
            .execute(
                &ExecutionContext::system("email_notification_task", "mail_queue"),
                &data,
            )
            .await
            .unwrap();

        assert_eq!(result["recipient"], "ops@example.com");
        assert_eq!(db.count_rows("email_outbox").await.unwrap(), 1);
    }

    #[test]
    fn rejects_invalid_recipient_and_missing_fields() {
        let handler = EmailNotificationHandler::new(Arc::new(NoopOutbox));
        assert!(handler
            .validate(&json!({"to": "nobody", "subject": "s", "body": "b"}))
            .is_err());
        assert!(handler
            .validate(&json!({"to": "a@b.c", "subject": " ", "body": "b"}))
            .is_err());
        assert!(handler.validate(&json!({"to": "a@b.c", "subject": "s"})).is_err());
    }

    struct NoopOutbox;

    #[async_trait]
    impl EmailOutbox for NoopOutbox {
        async fn stage(&self, _email: OutgoingEmail) -> SchedulerResult<i64> {
            Ok(1)
        }
    }
}
