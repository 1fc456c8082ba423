//! # taskq
//!
//! 后台任务队列与定时调度系统的服务组装：按配置创建队列驱动、事件总线、
//! 调度器与 Worker，并负责优雅关闭。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;
