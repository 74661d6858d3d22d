//! HTTP 请求处理器模块
//!
//! 包含所有 REST API 端点的处理器实现

pub mod automation_rule;
