// ==========================================
// 培训管理系统 - 情景数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 所有改变聚合值/状态的写入都带 revision 校验 (乐观锁)
// 事务: 明细批量写入 + 聚合刷新 + revision 递增 同事务提交
// ==========================================

mod commit;
mod line_item;
mod workspace;

#[cfg(test)]
mod tests;

pub use line_item::LineItemQuery;
pub use workspace::{ScenarioQuery, ScenarioRepository};
