//! 规则引擎错误类型

use crate::validator::ValidationErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则校验失败: {0}")]
    Validation(ValidationErrors),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("规则未启用: {0}")]
    InactiveRule(String),

    #[error("动作执行失败: {action_type}: {message}")]
    Dispatch {
        action_type: String,
        message: String,
    },

    #[error("事件发布失败: {0}")]
    EventSink(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    pub fn dispatch(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispatch {
            action_type: action_type.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
