//! 规则生命周期事件
//!
//! 创建、更新、删除、启停和执行都会产生一个 [`RuleEvent`]，由调用方交给
//! [`RuleEventSink`] 处理（写活动日志、打日志等），引擎本身不做 IO。

use crate::analytics::ExecutionOutcome;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// 规则事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuleEvent {
    Created {
        rule_id: Uuid,
        name: String,
    },
    Updated {
        rule_id: Uuid,
        name: String,
        /// 定义变更导致统计被清零
        analytics_reset: bool,
    },
    Deleted {
        rule_id: Uuid,
        name: String,
    },
    StatusChanged {
        rule_id: Uuid,
        is_active: bool,
    },
    Executed {
        rule_id: Uuid,
        outcome: ExecutionOutcome,
        elapsed_ms: f64,
    },
}

impl RuleEvent {
    pub fn rule_id(&self) -> Uuid {
        match self {
            Self::Created { rule_id, .. }
            | Self::Updated { rule_id, .. }
            | Self::Deleted { rule_id, .. }
            | Self::StatusChanged { rule_id, .. }
            | Self::Executed { rule_id, .. } => *rule_id,
        }
    }

    /// 活动日志中的动作名
    pub fn action(&self) -> &'static str {
        match self {
            Self::Created { .. } => "automation_rule_created",
            Self::Updated { .. } => "automation_rule_updated",
            Self::Deleted { .. } => "automation_rule_deleted",
            Self::StatusChanged { .. } => "automation_rule_status_changed",
            Self::Executed { .. } => "automation_rule_executed",
        }
    }

    /// 给人看的描述
    pub fn describe(&self) -> String {
        match self {
            Self::Created { name, .. } => format!("Automation rule '{}' created", name),
            Self::Updated {
                name,
                analytics_reset,
                ..
            } => {
                if *analytics_reset {
                    format!("Automation rule '{}' updated, analytics reset", name)
                } else {
                    format!("Automation rule '{}' updated", name)
                }
            }
            Self::Deleted { name, .. } => format!("Automation rule '{}' deleted", name),
            Self::StatusChanged { is_active, .. } => {
                let state = if *is_active { "activated" } else { "deactivated" };
                format!("Automation rule {}", state)
            }
            Self::Executed {
                outcome,
                elapsed_ms,
                ..
            } => match outcome {
                ExecutionOutcome::Success => {
                    format!("Automation rule executed in {:.1}ms", elapsed_ms)
                }
                ExecutionOutcome::Failure(e) => {
                    format!("Automation rule failed after {:.1}ms: {}", elapsed_ms, e)
                }
            },
        }
    }
}

/// 事件接收方
#[async_trait]
pub trait RuleEventSink: Send + Sync {
    async fn publish(&self, event: &RuleEvent) -> Result<()>;
}

/// 只写日志的事件接收方
pub struct TracingEventSink;

#[async_trait]
impl RuleEventSink for TracingEventSink {
    async fn publish(&self, event: &RuleEvent) -> Result<()> {
        info!(
            rule_id = %event.rule_id(),
            action = event.action(),
            "{}",
            event.describe()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_metadata() {
        let rule_id = Uuid::now_v7();
        let event = RuleEvent::Executed {
            rule_id,
            outcome: ExecutionOutcome::Failure("webhook 502".into()),
            elapsed_ms: 12.5,
        };

        assert_eq!(event.rule_id(), rule_id);
        assert_eq!(event.action(), "automation_rule_executed");
        assert_eq!(event.describe(), "Automation rule failed after 12.5ms: webhook 502");
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = RuleEvent::StatusChanged {
            rule_id: Uuid::nil(),
            is_active: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "status_changed");
        assert_eq!(json["is_active"], false);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let event = RuleEvent::Created {
            rule_id: Uuid::now_v7(),
            name: "welcome".into(),
        };
        assert!(TracingEventSink.publish(&event).await.is_ok());
    }
}
