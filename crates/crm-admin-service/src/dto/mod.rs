//! 数据传输对象
//!
//! 包含所有请求和响应的数据传输对象

pub mod request;
pub mod response;

pub use request::{
    CreateAutomationRuleRequest, ExecuteRuleRequest, RuleQueryFilter, TestRuleRequest,
    UpdateAutomationRuleRequest,
};

pub use response::{ApiResponse, ExecuteRuleResponse, PageResponse, RuleStats};
