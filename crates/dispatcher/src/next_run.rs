use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tracing::warn;

use taskq_core::models::TaskDefinition;
use taskq_core::{SchedulerError, SchedulerResult};

/// CRON表达式解析
///
/// 支持秒级的6/7段表达式；传统的5段表达式会补上秒字段 `0`。
pub struct CronSchedule {
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(cron_expr: &str) -> SchedulerResult<Self> {
        let normalized = normalize_cron_expression(cron_expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self { schedule })
    }

    /// 严格晚于 `from` 的下一次执行时间
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&from).next()
    }

    /// 从指定时间开始的多个执行时间
    pub fn upcoming(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&from).take(count).collect()
    }

    /// 验证CRON表达式是否有效
    pub fn validate(cron_expr: &str) -> SchedulerResult<()> {
        Self::parse(cron_expr).map(|_| ())
    }
}

/// 5段表达式补齐秒字段
pub fn normalize_cron_expression(cron_expr: &str) -> String {
    let trimmed = cron_expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// 计算任务定义的下一次执行时间
///
/// 固定间隔优先；否则按CRON表达式；两者都不可用时回退到 `now + fallback`。
pub fn compute_next_run(
    definition: &TaskDefinition,
    now: DateTime<Utc>,
    fallback: Duration,
) -> DateTime<Utc> {
    if let Some(period) = definition.period_seconds.filter(|p| *p > 0) {
        match Duration::try_seconds(period).and_then(|d| now.checked_add_signed(d)) {
            Some(next) => return next,
            None => {
                warn!(
                    "任务定义 {} 的执行间隔 {} 秒超出时间范围，使用回退间隔",
                    definition.id, period
                );
                return now + fallback;
            }
        }
    }

    if let Some(expr) = definition.cron_expr.as_deref().filter(|e| !e.trim().is_empty()) {
        match CronSchedule::parse(expr) {
            Ok(schedule) => {
                if let Some(next) = schedule.next_after(now) {
                    return next;
                }
                warn!(
                    "任务定义 {} 的CRON表达式 {} 没有后续执行时间，使用回退间隔",
                    definition.id, expr
                );
            }
            Err(e) => {
                warn!("任务定义 {} 的CRON表达式无效，使用回退间隔: {}", definition.id, e);
            }
        }
        return now + fallback;
    }

    warn!(
        "任务定义 {} 既没有执行间隔也没有CRON表达式，使用回退间隔",
        definition.id
    );
    now + fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use taskq_testing_utils::TaskDefinitionBuilder;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn parses_second_precision_expressions() {
        assert!(CronSchedule::validate("0 0 0 * * *").is_ok());
        assert!(CronSchedule::validate("0 */5 * * * *").is_ok());
        assert!(CronSchedule::validate("invalid").is_err());
        assert!(CronSchedule::validate("").is_err());
    }

    #[test]
    fn five_field_expressions_get_seconds() {
        assert_eq!(normalize_cron_expression("*/15 * * * *"), "0 */15 * * * *");
        assert_eq!(normalize_cron_expression(" 0 0 * * * * "), "0 0 * * * *");

        let schedule = CronSchedule::parse("*/15 * * * *").unwrap();
        assert_eq!(schedule.next_after(at(10, 15, 0)), Some(at(10, 30, 0)));
    }

    #[test]
    fn upcoming_times_are_ordered() {
        let schedule = CronSchedule::parse("0 0 * * * *").unwrap();
        let upcoming = schedule.upcoming(at(12, 30, 0), 3);
        let hours: Vec<u32> = upcoming.iter().map(|t| t.hour()).collect();
        assert_eq!(hours, vec![13, 14, 15]);
    }

    #[test]
    fn period_wins_over_cron() {
        let definition = TaskDefinitionBuilder::new()
            .every(90)
            .cron("0 0 * * * *")
            .build();
        let now = at(10, 0, 0);
        assert_eq!(
            compute_next_run(&definition, now, Duration::hours(1)),
            now + Duration::seconds(90)
        );
    }

    #[test]
    fn cron_next_run_is_strictly_after_now() {
        let definition = TaskDefinitionBuilder::new().cron("0 0 * * * *").build();
        assert_eq!(
            compute_next_run(&definition, at(10, 0, 0), Duration::hours(1)),
            at(11, 0, 0)
        );
    }

    #[test]
    fn invalid_cron_falls_back() {
        let definition = TaskDefinitionBuilder::new().cron("not a cron").build();
        let now = at(10, 0, 0);
        assert_eq!(
            compute_next_run(&definition, now, Duration::hours(1)),
            now + Duration::hours(1)
        );
    }

    #[test]
    fn out_of_range_period_falls_back() {
        let definition = TaskDefinitionBuilder::new().every(10_000_000_000_000).build();
        let now = at(10, 0, 0);
        assert_eq!(
            compute_next_run(&definition, now, Duration::hours(1)),
            now + Duration::hours(1)
        );

        let definition = TaskDefinitionBuilder::new().every(i64::MAX).build();
        assert_eq!(
            compute_next_run(&definition, now, Duration::hours(1)),
            now + Duration::hours(1)
        );
    }

    #[test]
    fn missing_schedule_falls_back() {
        let definition = TaskDefinitionBuilder::new().build();
        let now = at(10, 0, 0);
        assert_eq!(
            compute_next_run(&definition, now, Duration::minutes(5)),
            now + Duration::minutes(5)
        );
    }
}
