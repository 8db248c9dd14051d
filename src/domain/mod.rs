// ==========================================
// 培训管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、杠杆契约
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod levers;
pub mod plan;
pub mod scenario;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use levers::{EntityCap, LeverConfig, LeverError};
pub use plan::{TrainingPlan, TrainingPlanLine};
pub use scenario::{
    LineAdjustment, ScenarioLineItem, ScenarioTotals, ScenarioWorkspace,
    MAX_LINE_VOLUME, SNAPSHOT_COMPLETE_PROGRESS, SNAPSHOT_FAILED_PROGRESS,
};
pub use types::{
    BudgetType, CutTraversal, ExportColumnGroup, PriorityBand, ScenarioStatus, VisibilityScope,
};
