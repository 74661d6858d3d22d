//! CRM 管理后台服务
//!
//! 提供自动化规则的配置、试运行与手动执行 REST API。
//!
//! ## 核心功能
//!
//! - **规则管理**：规则的 CRUD 操作、启用停用，规则名称全局唯一
//! - **试运行**：使用样例数据评估条件，返回将执行的动作，不产生副作用
//! - **手动执行**：对指定目标执行规则，维护执行统计
//! - **活动日志**：规则生命周期事件写入 activity_logs
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `models`: 服务特有的实体模型
//! - `repository`: 规则持久化（PostgreSQL / 内存）
//! - `service`: 业务编排
//! - `activity`: 规则事件的活动日志接收方
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod activity;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

// 重新导出核心类型
pub use dto::{
    ApiResponse, CreateAutomationRuleRequest, ExecuteRuleRequest, ExecuteRuleResponse,
    PageResponse, RuleQueryFilter, RuleStats, TestRuleRequest, UpdateAutomationRuleRequest,
};
pub use error::{AdminError, Result};
pub use models::ActivityLog;
pub use service::AutomationRuleService;
