pub mod app_config;
pub mod database;
pub mod events_observability;
pub mod queue;
pub mod scheduler_worker;

// Re-export main types for easier imports
pub use app_config::{AppConfig, Profile, QUEUE_DRIVER_ENV};
pub use database::DatabaseConfig;
pub use events_observability::{EventsConfig, LogFormat, ObservabilityConfig};
pub use queue::{QueueConfig, RedisConfig};
pub use scheduler_worker::{SchedulerConfig, WorkerConfig};
