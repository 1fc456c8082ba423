//! # taskq 核心模块
//!
//! 定义任务队列系统的领域模型、错误类型、配置模型以及各组件之间的接口。
//!
//! - [`models`] - 队列任务、任务定义、执行历史、队列信息等数据结构
//! - [`traits`] - 队列适配器、任务存储、仓储、处理器等接口
//! - [`config`] - 应用配置模型与加载逻辑
//! - [`queue_presentation`] - 队列名称、分类、颜色等展示信息
//! - [`routing`] - 任务类型到队列的路由

pub mod config;
pub mod errors;
pub mod models;
pub mod queue_presentation;
pub mod routing;
pub mod traits;

pub use errors::{SchedulerError, SchedulerResult};
pub use models::*;
pub use traits::*;
