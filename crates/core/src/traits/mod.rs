pub mod queue_adapter;
pub mod repository;
pub mod task_handler;
pub mod task_store;

pub use queue_adapter::*;
pub use repository::*;
pub use task_handler::*;
pub use task_store::*;
