//! 动作派发
//!
//! 通过 `ActionDispatcher` trait 抽象真实副作用（发邮件、短信、回调等）。
//! 默认的 [`LoggingDispatcher`] 只记录日志，接入真实渠道时实现同一 trait 即可。

use crate::error::Result;
use crate::models::{AutomationRule, Record};
use crate::selector::SelectedAction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 执行目标（被规则作用的 CRM 记录）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTarget {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default, skip_serializing)]
    pub data: Record,
}

impl ExecutionTarget {
    pub fn new(id: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_type: target_type.into(),
            data: Record::new(),
        }
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = data;
        self
    }
}

/// 动作派发器
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// 执行单个动作
    async fn dispatch(
        &self,
        rule: &AutomationRule,
        action: &SelectedAction,
        target: &ExecutionTarget,
    ) -> Result<()>;
}

/// 只记录日志的派发器
///
/// 无法派发的动作类型（未知或仅存在于持久化模型中的）按空操作处理。
pub struct LoggingDispatcher;

#[async_trait]
impl ActionDispatcher for LoggingDispatcher {
    async fn dispatch(
        &self,
        rule: &AutomationRule,
        action: &SelectedAction,
        target: &ExecutionTarget,
    ) -> Result<()> {
        if !action.action_type.is_dispatchable() {
            warn!(
                rule_id = %rule.id,
                action_type = %action.action_type,
                "Skipping action type without a dispatcher"
            );
            return Ok(());
        }

        info!(
            rule_id = %rule.id,
            action_type = %action.action_type,
            order = action.order,
            target_id = %target.id,
            target_type = %target.target_type,
            "Dispatching automation action"
        );
        Ok(())
    }
}
