// ==========================================
// 培训管理系统 - 情景重算引擎层
// ==========================================
// 职责: 快照构建、预算分配、局部调整、采纳导出
// 红线: Engine 不拼 SQL, 所有写入经由仓储层事务提交
// ==========================================

pub mod adjustment;
pub mod allocation;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod promotion;
pub mod recalc;
pub mod scenario_lock;
pub mod snapshot;
pub mod summary;

// 重导出核心引擎
pub use adjustment::{AdjustLineRequest, AdjustLineResult, AdjustmentHandler};
pub use allocation::{
    AllocationEngine, AllocationOutcome, AllocationWarning, LineDisposition,
};
pub use error::{EngineResult, ScenarioEngineError};
pub use export::{ExportRequest, ExportService, ExportTable};
pub use lifecycle::LifecycleService;
pub use promotion::{PromoteRequest, PromoteResult, PromotionHandler};
pub use recalc::{RecalcEngine, RecalcResult};
pub use scenario_lock::{with_scenario_lock, ScenarioLockRegistry};
pub use snapshot::{CreateScenarioRequest, SnapshotBuilder, SnapshotLaunch, SnapshotReport};
pub use summary::{summarize, BandSummary, ScenarioSummary};
