//! # taskq 调度器
//!
//! 周期任务调度：查找到期的任务定义，按路由入队，并按固定间隔或CRON表达式推进下次执行时间。

pub mod next_run;
pub mod scheduler;

pub use next_run::{compute_next_run, normalize_cron_expression, CronSchedule};
pub use scheduler::{build_payload, SchedulePassReport, TaskScheduler};
