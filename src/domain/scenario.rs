// ==========================================
// 培训管理系统 - 预算情景领域模型
// ==========================================
// 职责: 情景工作区 / 情景明细
// 红线: 情景只是基准计划的隔离副本,不可反向修改基准计划
// ==========================================

use crate::domain::levers::LeverConfig;
use crate::domain::types::{PriorityBand, ScenarioStatus, VisibilityScope};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 快照失败时的 creation_progress 标记值
pub const SNAPSHOT_FAILED_PROGRESS: i32 = -1;

/// 快照完成时的 creation_progress
pub const SNAPSHOT_COMPLETE_PROGRESS: i32 = 100;

/// 单条明细人数上限（基准复制与局部调整共用）
pub const MAX_LINE_VOLUME: i64 = 1_000_000;

// ==========================================
// ScenarioWorkspace - 情景工作区
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioWorkspace {
    pub scenario_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: ScenarioStatus,
    pub owner: String,
    pub visibility_scope: VisibilityScope,

    // ===== 基准指针 (创建后不可变) =====
    pub basis_plan_id: String,
    pub basis_plan_version: i32,

    // ===== 聚合字段 (每次重算/调整后按明细重算) =====
    pub baseline_total_cost: f64,
    pub scenario_total_cost: f64,
    pub baseline_total_participants: i64,
    pub scenario_total_participants: i64,

    // ===== 最近一次使用的杠杆 (审计/续算) =====
    pub levers: Option<LeverConfig>,

    pub creation_progress: i32,   // 0-100, -1 表示快照失败
    pub promoted_to_plan_id: Option<String>,
    pub last_recalculation_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub revision: i32,            // 乐观锁：修订号
}

impl ScenarioWorkspace {
    /// 快照是否完整（只有完整快照的聚合值可信）
    pub fn is_snapshot_complete(&self) -> bool {
        self.status != ScenarioStatus::Creating
            && self.creation_progress == SNAPSHOT_COMPLETE_PROGRESS
    }

    pub fn is_snapshot_failed(&self) -> bool {
        self.creation_progress == SNAPSHOT_FAILED_PROGRESS
    }
}

// ==========================================
// LineAdjustment - 明细调整状态
// ==========================================
// 单向迁移: Engine -> Locked，没有解锁路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineAdjustment {
    /// 由重算引擎管理
    Engine,
    /// 人工锁定，重算引擎不再触碰
    Locked {
        reason: Option<String>,
        adjusted_by: String,
        adjusted_at: NaiveDateTime,
    },
}

impl LineAdjustment {
    pub fn is_locked(&self) -> bool {
        matches!(self, LineAdjustment::Locked { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            LineAdjustment::Locked { reason, .. } => reason.as_deref(),
            LineAdjustment::Engine => None,
        }
    }
}

// ==========================================
// ScenarioLineItem - 情景明细
// ==========================================
// 复合定位: scenario_id + line_no (line_no 决定遍历顺序)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioLineItem {
    pub line_id: String,
    pub scenario_id: String,
    pub line_no: i32,
    pub source_line_id: Option<String>,

    // ===== 课程/实体/类别 =====
    pub course_id: String,
    pub course_name: String,
    pub entity_id: Option<String>,
    pub category_id: Option<String>,

    // ===== 基准 (复制时确定，不再变化) =====
    pub baseline_volume: i64,
    pub baseline_sessions: i64,
    pub baseline_cost: f64,
    pub baseline_cost_per_participant: f64,

    // ===== 情景值 =====
    pub scenario_volume: i64,
    pub scenario_sessions: i64,
    pub scenario_cost: f64,

    // ===== 分类 =====
    pub priority_band: PriorityBand,
    pub is_protected: bool,
    pub is_abroad: bool,

    // ===== 调整状态 =====
    pub adjustment: LineAdjustment,

    // ===== 报表派生 =====
    pub is_cut: bool,
}

impl ScenarioLineItem {
    pub fn is_locally_adjusted(&self) -> bool {
        self.adjustment.is_locked()
    }

    pub fn volume_delta(&self) -> i64 {
        self.scenario_volume - self.baseline_volume
    }

    pub fn cost_delta(&self) -> f64 {
        self.scenario_cost - self.baseline_cost
    }
}

/// 复制时计算人均成本（基准人数为 0 时记为 0，由分配引擎做退化保护）
pub fn cost_per_participant(baseline_cost: f64, baseline_volume: i64) -> f64 {
    if baseline_volume > 0 {
        baseline_cost / baseline_volume as f64
    } else {
        0.0
    }
}

/// 按人数等比例折算班次（向上取整，人数为 0 时班次为 0）
pub fn scale_sessions(baseline_sessions: i64, baseline_volume: i64, volume: i64) -> i64 {
    if volume <= 0 {
        return 0;
    }
    if baseline_volume <= 0 {
        return baseline_sessions;
    }
    // 整数向上取整；i128 中间值不会溢出，结果超出 i64 时取上限
    let numerator = baseline_sessions as i128 * volume as i128;
    let denominator = baseline_volume as i128;
    let sessions = (numerator + denominator - 1) / denominator;
    i64::try_from(sessions).unwrap_or(i64::MAX)
}

// ==========================================
// ScenarioTotals - 工作区聚合值
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioTotals {
    pub baseline_total_cost: f64,
    pub scenario_total_cost: f64,
    pub baseline_total_participants: i64,
    pub scenario_total_participants: i64,
}

impl ScenarioTotals {
    /// 按全部明细求和（包括锁定/被排除的明细）
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a ScenarioLineItem>,
    {
        lines.into_iter().fold(Self::default(), |mut acc, line| {
            acc.baseline_total_cost += line.baseline_cost;
            acc.scenario_total_cost += line.scenario_cost;
            acc.baseline_total_participants += line.baseline_volume;
            acc.scenario_total_participants += line.scenario_volume;
            acc
        })
    }
}
