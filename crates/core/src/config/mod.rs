//! 应用配置
//!
//! 加载顺序：内置默认值、TOML 配置文件、`TASKQ_` 前缀的环境变量（`__` 分隔层级）。
//! 队列驱动另外支持 `QUEUE_DRIVER` 环境变量覆盖。

pub mod models;

pub use models::*;
