//! 自动化规则 API 处理器
//!
//! 只做参数提取和响应封装，业务逻辑在 `AutomationRuleService` 中

use axum::{
    Json,
    extract::{Path, Query, State},
};
use rule_engine::{AutomationRule, TestReport};
use uuid::Uuid;

use crate::{
    dto::{
        ApiResponse, CreateAutomationRuleRequest, ExecuteRuleRequest, ExecuteRuleResponse,
        PageResponse, RuleQueryFilter, RuleStats, TestRuleRequest, UpdateAutomationRuleRequest,
    },
    error::AdminError,
    state::AppState,
};

/// 创建自动化规则
///
/// POST /api/automation-rules
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateAutomationRuleRequest>,
) -> Result<Json<ApiResponse<AutomationRule>>, AdminError> {
    let rule = state.rules.create(req).await?;
    Ok(Json(ApiResponse::success_with_message(rule, "规则创建成功")))
}

/// 获取规则列表（分页、筛选）
///
/// GET /api/automation-rules
pub async fn list_rules(
    State(state): State<AppState>,
    Query(filter): Query<RuleQueryFilter>,
) -> Result<Json<ApiResponse<PageResponse<AutomationRule>>>, AdminError> {
    let page = state.rules.list(filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

/// 获取规则统计
///
/// GET /api/automation-rules/stats
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RuleStats>>, AdminError> {
    let stats = state.rules.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// 获取规则详情
///
/// GET /api/automation-rules/{id}
pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AutomationRule>>, AdminError> {
    let rule = state.rules.get(id).await?;
    Ok(Json(ApiResponse::success(rule)))
}

/// 更新规则
///
/// PUT /api/automation-rules/{id}
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAutomationRuleRequest>,
) -> Result<Json<ApiResponse<AutomationRule>>, AdminError> {
    let rule = state.rules.update(id, req).await?;
    Ok(Json(ApiResponse::success_with_message(rule, "规则更新成功")))
}

/// 删除规则
///
/// DELETE /api/automation-rules/{id}
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, AdminError> {
    state.rules.delete(id).await?;
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 切换启用状态
///
/// PATCH /api/automation-rules/{id}/toggle
pub async fn toggle_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AutomationRule>>, AdminError> {
    let rule = state.rules.toggle(id).await?;
    let message = if rule.is_active { "规则已启用" } else { "规则已停用" };
    Ok(Json(ApiResponse::success_with_message(rule, message)))
}

/// 试运行规则
///
/// POST /api/automation-rules/{id}/test
pub async fn test_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TestRuleRequest>,
) -> Result<Json<ApiResponse<TestReport>>, AdminError> {
    let report = state.rules.test(id, req).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// 手动执行规则
///
/// POST /api/automation-rules/{id}/execute
pub async fn execute_rule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ExecuteRuleRequest>,
) -> Result<Json<ApiResponse<ExecuteRuleResponse>>, AdminError> {
    let resp = state.rules.execute(id, req).await?;
    Ok(Json(ApiResponse::success(resp)))
}
