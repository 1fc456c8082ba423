use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig,
    events_observability::{EventsConfig, ObservabilityConfig},
    queue::{QueueConfig, RedisConfig},
    scheduler_worker::{SchedulerConfig, WorkerConfig},
};
use crate::models::QueueDriver;

/// 覆盖队列驱动的环境变量
pub const QUEUE_DRIVER_ENV: &str = "QUEUE_DRIVER";

/// 运行档位
///
/// - `Starter`: 单进程，SQLite 同时承担存储与队列
/// - `Full`: Redis 承担队列与实时事件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Starter,
    Full,
}

impl Profile {
    pub fn default_driver(&self) -> QueueDriver {
        match self {
            Profile::Starter => QueueDriver::Database,
            Profile::Full => QueueDriver::Redis,
        }
    }
}

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile: Profile,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub events: EventsConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: TASKQ_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/taskq.toml", "taskq.toml", "/etc/taskq/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TASKQ")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 按 配置值、`QUEUE_DRIVER` 环境变量、运行档位 的顺序决定队列驱动
    pub fn resolve_driver(&self) -> Result<QueueDriver> {
        let env_value = std::env::var(QUEUE_DRIVER_ENV).ok();
        self.resolve_driver_with(env_value.as_deref())
    }

    pub fn resolve_driver_with(&self, env_value: Option<&str>) -> Result<QueueDriver> {
        if let Some(driver) = self.queue.driver {
            return Ok(driver);
        }
        match env_value.filter(|v| !v.trim().is_empty()) {
            Some(value) => value
                .parse::<QueueDriver>()
                .with_context(|| format!("{} 环境变量无效", QUEUE_DRIVER_ENV)),
            None => Ok(self.profile.default_driver()),
        }
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        if let Some(redis) = &self.redis {
            redis.validate().context("Redis配置验证失败")?;
        }

        self.queue.validate().context("队列配置验证失败")?;
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.events.validate().context("事件配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        let driver = self.resolve_driver()?;
        if driver == QueueDriver::Redis && self.redis.is_none() {
            return Err(anyhow::anyhow!("队列驱动为redis，但未配置[redis]"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_starter_with_database_driver() {
        let config = AppConfig::default();
        assert_eq!(config.profile, Profile::Starter);
        assert_eq!(
            config.resolve_driver_with(None).unwrap(),
            QueueDriver::Database
        );
        assert_eq!(config.scheduler.interval_seconds, 30);
        assert_eq!(config.worker.batch_size, 3);
        assert_eq!(config.worker.orphan_timeout_seconds, 120);
    }

    #[test]
    fn driver_resolution_order() {
        let mut config = AppConfig::default();
        assert_eq!(
            config.resolve_driver_with(Some("redis")).unwrap(),
            QueueDriver::Redis
        );

        config.queue.driver = Some(QueueDriver::Database);
        assert_eq!(
            config.resolve_driver_with(Some("redis")).unwrap(),
            QueueDriver::Database
        );

        config.queue.driver = None;
        config.profile = Profile::Full;
        assert_eq!(config.resolve_driver_with(None).unwrap(), QueueDriver::Redis);
        assert!(config.resolve_driver_with(Some("kafka")).is_err());
    }

    #[test]
    fn redis_driver_without_redis_section_is_rejected() {
        let toml = r#"
            [queue]
            driver = "redis"
        "#;
        let err = AppConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("redis"));
    }

    #[test]
    fn loads_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
profile = "full"

[database]
url = "sqlite::memory:"

[redis]
url = "redis://localhost:6380"

[queue]
key_prefix = "jobs"

[queue.routes]
email_notification_task = "priority_mail"

[worker]
batch_size = 5
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.profile, Profile::Full);
        assert_eq!(config.queue.key_prefix, "jobs");
        assert_eq!(config.worker.batch_size, 5);
        assert_eq!(config.worker.poll_interval_seconds, 10);
        assert_eq!(
            config.queue.routing().resolve("email_notification_task"),
            "priority_mail"
        );
        assert_eq!(config.redis.unwrap().url, "redis://localhost:6380");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(AppConfig::load(Some("/nonexistent/taskq.toml")).is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
