// ==========================================
// 培训管理系统 - API层错误类型
// ==========================================
// 职责: 将仓储/引擎错误转换为调用方可读的错误消息
// 要求: 所有错误信息必须包含显式原因
// ==========================================

use crate::engine::error::ScenarioEngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("情景快照未完成: {0}")]
    SnapshotIncomplete(String),

    #[error("情景已采纳: {0}")]
    AlreadyPromoted(String),

    #[error("缺少调整理由: {0}")]
    JustificationRequired(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                scenario_id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "情景{}已被其他操作修改（期望revision={}，实际revision={}）",
                scenario_id, expected, actual
            )),

            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }

            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ScenarioEngineError 转换
// ==========================================
impl From<ScenarioEngineError> for ApiError {
    fn from(err: ScenarioEngineError) -> Self {
        match err {
            ScenarioEngineError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            ScenarioEngineError::SnapshotIncomplete {
                scenario_id,
                progress,
            } => ApiError::SnapshotIncomplete(format!(
                "情景{}快照进度为{}，聚合值不可用",
                scenario_id, progress
            )),
            ScenarioEngineError::NotEditable {
                scenario_id,
                status,
            } => ApiError::BusinessRuleViolation(format!(
                "情景{}处于{}状态，不可修改",
                scenario_id, status
            )),
            ScenarioEngineError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            ScenarioEngineError::AlreadyPromoted {
                scenario_id,
                plan_id,
            } => ApiError::AlreadyPromoted(format!(
                "情景{}已采纳为计划{}",
                scenario_id, plan_id
            )),
            ScenarioEngineError::JustificationRequired {
                line_id,
                current_volume,
                new_volume,
            } => ApiError::JustificationRequired(format!(
                "明细{}人数从{}增加到{}需要填写理由",
                line_id, current_volume, new_volume
            )),
            ScenarioEngineError::InvalidLevers(e) => ApiError::InvalidInput(e.to_string()),
            ScenarioEngineError::Validation(msg) => ApiError::InvalidInput(msg),
            ScenarioEngineError::Export(msg) => ApiError::InternalError(msg),
            ScenarioEngineError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
