//! 管理后台错误类型定义

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rule_engine::{FieldError, RuleError};
use serde_json::json;

/// 管理后台错误类型
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),
    #[error("规则定义无效: {}", format_field_errors(.0))]
    RuleValidation(Vec<FieldError>),

    // 资源不存在
    #[error("规则不存在: {0}")]
    RuleNotFound(String),

    // 业务错误
    #[error("规则未启用，无法执行: {0}")]
    InactiveRule(String),
    #[error("规则名称已存在: {0}")]
    RuleNameConflict(String),

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AdminError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::RuleValidation(_) | Self::InactiveRule(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::RuleNotFound(_) => StatusCode::NOT_FOUND,
            Self::RuleNameConflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::RuleValidation(_) => "RULE_VALIDATION_ERROR",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::InactiveRule(_) => "INACTIVE_RULE",
            Self::RuleNameConflict(_) => "RULE_NAME_CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database operation failed");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let data = match &self {
            Self::RuleValidation(errors) => json!(errors),
            _ => serde_json::Value::Null,
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": data
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for AdminError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从 JSON 序列化错误转换
impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// 从规则引擎错误转换
impl From<RuleError> for AdminError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Validation(errors) => Self::RuleValidation(errors.into_inner()),
            RuleError::RuleNotFound(id) => Self::RuleNotFound(id),
            RuleError::InactiveRule(id) => Self::InactiveRule(id),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, AdminError>;
