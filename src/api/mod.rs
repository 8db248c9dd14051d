// ==========================================
// 培训管理系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口，负责输入校验与错误转换
// ==========================================

pub mod error;
pub mod scenario_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use scenario_api::{AuditTrailPage, LineItemPage, ScenarioApi, ScenarioPage, MAX_PAGE_SIZE};
