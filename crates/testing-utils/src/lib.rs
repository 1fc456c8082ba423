//! # taskq 测试工具
//!
//! 工作区内各 crate 共享的测试替身与测试环境：
//!
//! - **Mock**：可配置行为的任务处理器、内存队列适配器、内存用户目录
//! - **测试数据库**：迁移完成的内存 SQLite 及全部仓储实现
//! - **Redis 容器**：基于 testcontainers 的 Redis 驱动测试环境
//! - **构造器**：带默认值的队列任务与任务定义构造器
//! - **辅助函数**：条件等待、事件收集
//!
//! 作为 dev-dependency 引入：
//!
//! ```toml
//! [dev-dependencies]
//! taskq-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod containers;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use containers::*;
pub use helpers::*;
pub use mocks::*;
