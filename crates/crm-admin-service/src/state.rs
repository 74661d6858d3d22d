//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use rule_engine::LoggingDispatcher;

use crate::activity::MemoryActivityLog;
use crate::repository::MemoryAutomationRuleRepository;
use crate::service::AutomationRuleService;

/// Axum 应用共享状态
///
/// 服务通过 Arc 在 handler 间共享，存储后端在启动时决定
#[derive(Clone)]
pub struct AppState {
    pub rules: Arc<AutomationRuleService>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(rules: Arc<AutomationRuleService>) -> Self {
        Self { rules }
    }

    /// 基于内存仓储的状态，活动日志句柄一并返回以便检查
    pub fn in_memory() -> (Self, Arc<MemoryActivityLog>) {
        let activity = Arc::new(MemoryActivityLog::new());
        let service = AutomationRuleService::new(
            Arc::new(MemoryAutomationRuleRepository::new()),
            activity.clone(),
            Arc::new(LoggingDispatcher),
        );
        (Self::new(Arc::new(service)), activity)
    }
}
