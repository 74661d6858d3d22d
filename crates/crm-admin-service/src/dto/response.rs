//! 响应 DTO 定义
//!
//! 所有 REST API 的响应体结构

use rule_engine::ExecutionTarget;
use serde::Serialize;
use std::collections::BTreeMap;

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    /// 创建分页响应
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    /// 创建空分页响应
    pub fn empty(page: i64, page_size: i64) -> Self {
        Self::new(Vec::new(), 0, page, page_size)
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self::success_with_message(data, "操作成功")
    }

    /// 创建成功响应（无数据）
    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 手动执行结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRuleResponse {
    pub message: String,
    pub execution_time_ms: f64,
    pub target: ExecutionTarget,
    /// 仅在提供 targetData 时返回
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions_met: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_executed: Option<usize>,
}

/// 自动化规则统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStats {
    pub total_rules: i64,
    pub active_rules: i64,
    pub total_executions: i64,
    pub successful_executions: i64,
    pub failed_executions: i64,
    /// 按规则类型计数，未设置类型的规则计入 `unspecified`
    pub rules_by_type: BTreeMap<String, i64>,
}
