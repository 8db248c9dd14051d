// ==========================================
// 培训管理系统 - 操作日志领域模型
// ==========================================
// 红线: 所有情景写入必须记录
// 用途: 审计追踪 (只追加)
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,           // 日志ID
    pub scenario_id: Option<String>, // 关联情景 (情景删除后日志保留)
    pub action_type: String,         // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,    // 操作时间戳
    pub actor: String,               // 操作人

    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Created,           // 创建情景
    SnapshotCompleted, // 快照复制完成
    SnapshotFailed,    // 快照复制失败
    Recalculate,       // 重算
    LocalAdjustment,   // 局部调整
    StatusChange,      // 状态流转
    Promote,           // 采纳为新计划
    Export,            // 导出
    Delete,            // 删除情景
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Created => "created",
            ActionType::SnapshotCompleted => "snapshot_completed",
            ActionType::SnapshotFailed => "snapshot_failed",
            ActionType::Recalculate => "recalculate",
            ActionType::LocalAdjustment => "local_adjustment",
            ActionType::StatusChange => "status_change",
            ActionType::Promote => "promote",
            ActionType::Export => "export",
            ActionType::Delete => "delete",
        }
    }

    /// 从字符串解析
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(ActionType::Created),
            "snapshot_completed" => Some(ActionType::SnapshotCompleted),
            "snapshot_failed" => Some(ActionType::SnapshotFailed),
            "recalculate" => Some(ActionType::Recalculate),
            "local_adjustment" => Some(ActionType::LocalAdjustment),
            "status_change" => Some(ActionType::StatusChange),
            "promote" => Some(ActionType::Promote),
            "export" => Some(ActionType::Export),
            "delete" => Some(ActionType::Delete),
            _ => None,
        }
    }
}

impl ActionLog {
    /// 创建新的操作日志
    ///
    /// # 参数
    /// - `scenario_id`: 关联情景ID (可选)
    /// - `action_type`: 操作类型
    /// - `actor`: 操作人
    pub fn new(scenario_id: Option<String>, action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            scenario_id,
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.to_string(),
            payload_json: None,
            detail: None,
        }
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn kind(&self) -> Option<ActionType> {
        ActionType::parse(&self.action_type)
    }
}
