pub mod sqlite_email_outbox;
pub mod sqlite_queue_adapter;
pub mod sqlite_task_definition_repository;
pub mod sqlite_task_history_repository;
pub mod sqlite_task_store;
pub mod sqlite_user_directory;

pub use sqlite_email_outbox::SqliteEmailOutbox;
pub use sqlite_queue_adapter::SqliteQueueAdapter;
pub use sqlite_task_definition_repository::SqliteTaskDefinitionRepository;
pub use sqlite_task_history_repository::SqliteTaskHistoryRepository;
pub use sqlite_task_store::SqliteTaskStore;
pub use sqlite_user_directory::SqliteUserDirectory;

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use taskq_core::models::QueueTask;
use taskq_core::SchedulerResult;

use crate::database::mapping::MappingHelpers;

pub(crate) const QUEUE_TASK_COLUMNS: &str = "id, queue, task_type, name, data, priority, status, \
     attempts, max_attempts, error, created_at, updated_at, processed_at";

/// 认领条件：等待中且尚未用尽尝试次数
pub(crate) const CLAIMABLE: &str = "status = 'pending' AND attempts < max_attempts";

/// 执行顺序：优先级降序，创建时间升序，同一毫秒内按插入顺序
pub(crate) const CLAIM_ORDER: &str = "priority DESC, created_at ASC, rowid ASC";

pub(crate) fn row_to_queue_task(row: &SqliteRow) -> SchedulerResult<QueueTask> {
    Ok(QueueTask {
        id: row.try_get("id")?,
        queue: row.try_get("queue")?,
        task_type: row.try_get("task_type")?,
        name: row.try_get("name")?,
        data: MappingHelpers::get_json(row, "data")?,
        priority: row.try_get("priority")?,
        status: MappingHelpers::get_parsed(row, "status")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        error: row.try_get("error")?,
        created_at: MappingHelpers::get_datetime(row, "created_at")?,
        updated_at: MappingHelpers::get_datetime(row, "updated_at")?,
        processed_at: MappingHelpers::get_opt_datetime(row, "processed_at")?,
    })
}
