use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use taskq_core::config::AppConfig;
use taskq_core::models::{ListQueuesOptions, NewQueueTask, Pagination, QueueTaskStatus, TaskListQuery};
use taskq_core::QueueAdapter;
use taskq_infrastructure::{create_pool, MetricsCollector, QueueAdapterFactory, QueueEventBus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = CliApp::parse();
    cli.run().await
}

/// 队列运维命令行工具
#[derive(Parser, Debug)]
#[command(name = "taskq-cli")]
#[command(version)]
#[command(about = "taskq 队列运维命令行工具")]
#[command(long_about = "查看队列与任务、清空队列、手动入队与删除任务，输出为JSON")]
struct CliApp {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 队列管理
    Queues(QueueCommands),
    /// 任务管理
    Tasks(TaskCommands),
}

#[derive(Args, Debug)]
struct QueueCommands {
    #[command(subcommand)]
    action: QueueActions,
}

#[derive(Subcommand, Debug)]
enum QueueActions {
    /// 列出队列及统计
    List {
        /// 包含后端中发现但未配置的队列
        #[arg(long)]
        discovered: bool,
    },
    /// 分页查看队列中的任务
    Tasks {
        queue: String,
        #[arg(short, long, default_value = "20")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },
    /// 查看单个队列的统计
    Stats { queue: String },
    /// 清空队列，未指定时清空所有队列
    Clear { queue: Option<String> },
}

#[derive(Args, Debug)]
struct TaskCommands {
    #[command(subcommand)]
    action: TaskActions,
}

#[derive(Subcommand, Debug)]
enum TaskActions {
    /// 手动入队一个任务
    Enqueue {
        queue: String,
        /// 任务类型
        task_type: String,
        /// 任务数据 (JSON格式)
        #[arg(short, long, default_value = "{}")]
        data: String,
        /// 任务名称
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        priority: Option<i32>,
        #[arg(short, long)]
        max_attempts: Option<i32>,
    },
    /// 跨队列列出任务
    List {
        /// 状态过滤: pending / processing
        #[arg(short, long)]
        status: Option<String>,
        #[arg(short, long, default_value = "50")]
        limit: u32,
        #[arg(short, long, default_value = "0")]
        offset: u32,
    },
    /// 删除任务
    Delete { task_id: String },
}

impl CliApp {
    async fn run(self) -> Result<()> {
        let config = AppConfig::load(self.config.as_deref()).context("加载配置失败")?;
        let pool = create_pool(&config.database)
            .await
            .context("连接数据库失败")?;
        let queue = QueueAdapterFactory::create(&config, pool)
            .await
            .context("创建队列适配器失败")?;
        let events =
            QueueAdapterFactory::create_event_bus(&config, Arc::new(MetricsCollector::new())).await;

        let ctx = CliContext { queue, events };
        match self.command {
            Commands::Queues(cmd) => ctx.handle_queue_command(cmd.action).await,
            Commands::Tasks(cmd) => ctx.handle_task_command(cmd.action).await,
        }
    }
}

struct CliContext {
    queue: Arc<dyn QueueAdapter>,
    events: Arc<QueueEventBus>,
}

impl CliContext {
    async fn handle_queue_command(&self, action: QueueActions) -> Result<()> {
        match action {
            QueueActions::List { discovered } => {
                let options = if discovered {
                    ListQueuesOptions::with_discovered()
                } else {
                    ListQueuesOptions::default()
                };
                print_json(&self.queue.list_queues(options).await)
            }
            QueueActions::Tasks {
                queue,
                limit,
                offset,
            } => {
                let page = self
                    .queue
                    .get_queue_tasks(&queue, Pagination { limit, offset })
                    .await;
                print_json(&page)
            }
            QueueActions::Stats { queue } => print_json(&self.queue.get_queue_stats(&queue).await),
            QueueActions::Clear { queue } => {
                let removed = self
                    .queue
                    .clear_queue(queue.as_deref())
                    .await
                    .context("清空队列失败")?;
                self.events
                    .emit_queues_cleared(queue.as_deref(), removed)
                    .await;
                print_json(&serde_json::json!({
                    "queue": queue,
                    "removed": removed,
                }))
            }
        }
    }

    async fn handle_task_command(&self, action: TaskActions) -> Result<()> {
        match action {
            TaskActions::Enqueue {
                queue,
                task_type,
                data,
                name,
                priority,
                max_attempts,
            } => {
                let data: Value = serde_json::from_str(&data).context("任务数据不是合法的JSON")?;
                let mut task = NewQueueTask::new(task_type, data);
                if let Some(name) = name {
                    task = task.with_name(name);
                }
                if let Some(priority) = priority {
                    task = task.with_priority(priority);
                }
                if let Some(max_attempts) = max_attempts {
                    task = task.with_max_attempts(max_attempts);
                }

                let created = self
                    .queue
                    .add_task(&queue, task)
                    .await
                    .context("任务入队失败")?;
                self.events
                    .emit_tasks_added(&queue, std::slice::from_ref(&created))
                    .await;
                print_json(&created)
            }
            TaskActions::List {
                status,
                limit,
                offset,
            } => {
                let status = status
                    .map(|s| s.parse::<QueueTaskStatus>())
                    .transpose()
                    .context("无效的任务状态")?;
                let tasks = self
                    .queue
                    .get_all_tasks(TaskListQuery {
                        limit: Some(limit),
                        offset: Some(offset),
                        status,
                    })
                    .await;
                print_json(&tasks)
            }
            TaskActions::Delete { task_id } => {
                let deleted = self
                    .queue
                    .delete_task(&task_id)
                    .await
                    .context("删除任务失败")?;
                if !deleted {
                    anyhow::bail!("任务不存在: {task_id}");
                }
                print_json(&serde_json::json!({ "deleted": task_id }))
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("序列化输出失败")?
    );
    Ok(())
}
