//! 请求 DTO 定义
//!
//! 自动化规则 REST API 的请求参数和请求体结构

use rule_engine::{Record, RuleInput, RuleType};
use serde::Deserialize;
use validator::Validate;

/// 创建自动化规则请求
///
/// 规则定义部分（trigger / conditions / actions 等）平铺在请求体中，
/// 由 `RuleValidator` 校验；这里只校验名称和描述。
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAutomationRuleRequest {
    #[validate(length(min = 1, max = 100, message = "规则名称长度必须在1-100个字符之间"))]
    pub name: String,
    #[validate(length(max = 500, message = "规则描述不能超过500个字符"))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
    #[serde(flatten)]
    pub definition: RuleInput,
}

/// 更新自动化规则请求（部分更新）
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAutomationRuleRequest {
    #[validate(length(min = 1, max = 100, message = "规则名称长度必须在1-100个字符之间"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "规则描述不能超过500个字符"))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
    #[serde(flatten)]
    pub definition: RuleInput,
}

/// 规则列表查询参数
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleQueryFilter {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    pub rule_type: Option<RuleType>,
    pub is_active: Option<bool>,
    /// 按名称模糊搜索（不区分大小写）
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for RuleQueryFilter {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            rule_type: None,
            is_active: None,
            search: None,
        }
    }
}

impl RuleQueryFilter {
    /// 计算查询的 offset，超大页码饱和到 `i64::MAX` 而不是溢出
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit())
    }

    /// 获取限制条数（最大100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }

    /// 规范化后的搜索关键字，空白视为未提供
    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// 试运行请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRuleRequest {
    #[serde(default)]
    pub test_data: Record,
}

/// 手动执行请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRuleRequest {
    #[validate(length(min = 1, message = "targetId 不能为空"))]
    pub target_id: String,
    #[validate(length(min = 1, message = "targetType 不能为空"))]
    pub target_type: String,
    /// 提供时按该数据评估条件并派发动作
    pub target_data: Option<Record>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_request_flattens_definition() {
        let req: CreateAutomationRuleRequest = serde_json::from_value(json!({
            "name": "Welcome email",
            "ruleType": "notification",
            "trigger": {"eventType": "record_created"},
            "actions": [{"actionType": "send_email", "actionData": {"subject": "Hi"}}]
        }))
        .unwrap();

        assert!(req.validate().is_ok());
        assert_eq!(req.definition.rule_type, Some(RuleType::Notification));
        assert_eq!(req.definition.actions.as_ref().map(Vec::len), Some(1));
        assert!(req.definition.conditions.is_none());
    }

    #[test]
    fn test_create_request_name_length() {
        let req: CreateAutomationRuleRequest =
            serde_json::from_value(json!({"name": ""})).unwrap();
        assert!(req.validate().is_err());

        let req: CreateAutomationRuleRequest =
            serde_json::from_value(json!({"name": "x".repeat(101)})).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_filter_paging() {
        let filter = RuleQueryFilter {
            page: 3,
            page_size: 500,
            ..Default::default()
        };
        assert_eq!(filter.limit(), 100);
        assert_eq!(filter.offset(), 200);

        let filter = RuleQueryFilter {
            page: 0,
            search: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(filter.offset(), 0);
        assert_eq!(filter.search_term(), None);
    }

    #[test]
    fn test_filter_offset_saturates_on_huge_page() {
        let filter: RuleQueryFilter =
            serde_json::from_value(json!({"page": i64::MAX, "pageSize": 20})).unwrap();
        assert_eq!(filter.offset(), i64::MAX);

        let filter = RuleQueryFilter {
            page: i64::MAX / 50,
            page_size: 100,
            ..Default::default()
        };
        assert_eq!(filter.offset(), i64::MAX);
        assert!(filter.offset() >= 0);
    }

    #[test]
    fn test_execute_request_requires_target() {
        let req: ExecuteRuleRequest =
            serde_json::from_value(json!({"targetId": "", "targetType": "lead"})).unwrap();
        assert!(req.validate().is_err());
    }
}
