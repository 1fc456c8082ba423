//! # 数据模型
//!
//! 队列任务、任务定义、执行历史以及队列信息等核心数据结构。
//!
//! 所有时间字段使用 `DateTime<Utc>`，状态字段使用枚举类型。
//! 数据库中时间以 Unix 毫秒整数存储，排序与比较都在整数上完成。

pub mod execution;
pub mod notification;
pub mod queue_info;
pub mod queue_task;
pub mod task_definition;
pub mod task_history;
pub mod task_kind;

pub use execution::*;
pub use notification::*;
pub use queue_info::*;
pub use queue_task::*;
pub use task_definition::*;
pub use task_history::*;
pub use task_kind::*;
