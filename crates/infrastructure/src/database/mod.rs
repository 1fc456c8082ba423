pub mod mapping;
pub mod migrations;
pub mod pool;
pub mod sqlite;

pub use migrations::run_migrations;
pub use pool::{connect_in_memory, create_pool};
pub use sqlite::{
    SqliteEmailOutbox, SqliteQueueAdapter, SqliteTaskDefinitionRepository,
    SqliteTaskHistoryRepository, SqliteTaskStore, SqliteUserDirectory,
};
