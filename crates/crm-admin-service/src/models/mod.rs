//! 管理后台模型模块
//!
//! 包含服务特有的实体模型

pub mod activity_log;

pub use activity_log::ActivityLog;
