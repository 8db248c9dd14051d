// ==========================================
// 培训管理系统 - 培训计划数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 基准计划只读；新计划仅由情景采纳写入
// ==========================================

mod line;
mod plan;

pub use plan::TrainingPlanRepository;
pub(crate) use plan::insert_plan_with_lines;
