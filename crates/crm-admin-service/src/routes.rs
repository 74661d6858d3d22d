//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::{handlers, state::AppState};

/// 构建自动化规则路由
pub fn automation_rule_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/automation-rules",
            get(handlers::automation_rule::list_rules).post(handlers::automation_rule::create_rule),
        )
        .route(
            "/automation-rules/stats",
            get(handlers::automation_rule::get_stats),
        )
        .route(
            "/automation-rules/{id}",
            get(handlers::automation_rule::get_rule)
                .put(handlers::automation_rule::update_rule)
                .delete(handlers::automation_rule::delete_rule),
        )
        .route(
            "/automation-rules/{id}/toggle",
            patch(handlers::automation_rule::toggle_rule),
        )
        .route(
            "/automation-rules/{id}/test",
            post(handlers::automation_rule::test_rule),
        )
        .route(
            "/automation-rules/{id}/execute",
            post(handlers::automation_rule::execute_rule),
        )
}

/// 构建完整的 API 路由
///
/// 返回所有 API 路由（不含前缀，由调用方挂载到 /api 下）
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(automation_rule_routes())
}
