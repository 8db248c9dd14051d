// ==========================================
// 培训管理系统 - 情景引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 业务前置条件失败都在写入前返回
// ==========================================

use crate::domain::levers::LeverError;
use crate::domain::types::ScenarioStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScenarioEngineError {
    #[error("{entity}不存在: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("情景快照未完成: scenario_id={scenario_id}, progress={progress}")]
    SnapshotIncomplete { scenario_id: String, progress: i32 },

    #[error("情景当前状态不允许该操作: scenario_id={scenario_id}, status={status}")]
    NotEditable {
        scenario_id: String,
        status: ScenarioStatus,
    },

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition {
        from: ScenarioStatus,
        to: ScenarioStatus,
    },

    #[error("情景已采纳为计划: scenario_id={scenario_id}, plan_id={plan_id}")]
    AlreadyPromoted { scenario_id: String, plan_id: String },

    #[error("增加人数必须填写理由: line_id={line_id}, 当前={current_volume}, 调整为={new_volume}")]
    JustificationRequired {
        line_id: String,
        current_volume: i64,
        new_volume: i64,
    },

    #[error("杠杆配置无效: {0}")]
    InvalidLevers(#[from] LeverError),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("导出失败: {0}")]
    Export(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type EngineResult<T> = Result<T, ScenarioEngineError>;
