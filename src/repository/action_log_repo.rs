// ==========================================
// 培训管理系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有情景写入必须记录
// 说明: 只追加；scenario_id 不设外键，情景删除后日志保留
// ==========================================

mod core;
mod queries;


pub use core::ActionLogRepository;
pub use queries::AuditTrailQuery;
