//! 规则执行统计
//!
//! 只有执行路径会更新统计，试运行不会。持久化层需要保证同一规则的
//! 更新是串行的（行锁或条目锁），这里只负责计算。

use crate::models::AutomationRule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单次执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    Failure(String),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// 指标标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure(_) => "failure",
        }
    }
}

/// 规则执行统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleAnalytics {
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub average_execution_time_ms: f64,
    pub last_error: Option<String>,
}

impl RuleAnalytics {
    /// 记录一次执行
    ///
    /// 平均耗时按 `(old * (n - 1) + latest) / n` 滚动更新，n 为递增后的总次数。
    /// 成功时不会清除 `last_error`。
    pub fn record(&mut self, outcome: &ExecutionOutcome, elapsed_ms: f64, at: DateTime<Utc>) {
        self.total_executions += 1;
        match outcome {
            ExecutionOutcome::Success => self.successful_executions += 1,
            ExecutionOutcome::Failure(message) => {
                self.failed_executions += 1;
                self.last_error = Some(message.clone());
            }
        }

        let n = self.total_executions as f64;
        self.average_execution_time_ms =
            (self.average_execution_time_ms * (n - 1.0) + elapsed_ms) / n;
        self.last_executed_at = Some(at);
    }

    /// 清零（规则定义变更后使用）
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 成功率，未执行过时为 `None`
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_executions > 0)
            .then(|| self.successful_executions as f64 / self.total_executions as f64)
    }
}

/// 对规则记录一次执行并返回更新后的统计
pub fn record_execution<'a>(
    rule: &'a mut AutomationRule,
    outcome: &ExecutionOutcome,
    elapsed_ms: f64,
) -> &'a RuleAnalytics {
    rule.analytics.record(outcome, elapsed_ms, Utc::now());
    &rule.analytics
}
