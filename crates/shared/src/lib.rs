//! 共享库
//!
//! 包含 CRM 各服务共用的配置加载、数据库连接池与可观测性基础设施。

pub mod config;
pub mod database;
pub mod observability;
