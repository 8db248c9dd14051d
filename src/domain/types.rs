// ==========================================
// 培训管理系统 - 领域类型定义
// ==========================================
// 职责: 情景状态、可见范围、优先级分档、预算类型
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 情景状态 (Scenario Status)
// ==========================================
// 生命周期: CREATING -> DRAFT -> UNDER_REVIEW -> APPROVED -> ADOPTED
//           任意未采纳状态 -> ARCHIVED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    Creating,    // 快照复制中
    Draft,       // 草稿
    UnderReview, // 审核中
    Approved,    // 已批准
    Adopted,     // 已采纳 (终态)
    Archived,    // 已归档 (终态)
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl ScenarioStatus {
    /// 从字符串解析状态（未知值返回 None）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CREATING" => Some(ScenarioStatus::Creating),
            "DRAFT" => Some(ScenarioStatus::Draft),
            "UNDER_REVIEW" => Some(ScenarioStatus::UnderReview),
            "APPROVED" => Some(ScenarioStatus::Approved),
            "ADOPTED" => Some(ScenarioStatus::Adopted),
            "ARCHIVED" => Some(ScenarioStatus::Archived),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ScenarioStatus::Creating => "CREATING",
            ScenarioStatus::Draft => "DRAFT",
            ScenarioStatus::UnderReview => "UNDER_REVIEW",
            ScenarioStatus::Approved => "APPROVED",
            ScenarioStatus::Adopted => "ADOPTED",
            ScenarioStatus::Archived => "ARCHIVED",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScenarioStatus::Adopted | ScenarioStatus::Archived)
    }

    /// 是否允许重算/局部调整
    pub fn is_editable(&self) -> bool {
        matches!(self, ScenarioStatus::Draft | ScenarioStatus::UnderReview)
    }

    /// 状态迁移是否合法
    ///
    /// CREATING -> DRAFT 由快照构建器驱动（包括失败回退），不经由人工操作。
    pub fn can_transition_to(&self, next: ScenarioStatus) -> bool {
        use ScenarioStatus::*;
        match (self, next) {
            (Creating, Draft) => true,
            (Draft, UnderReview) => true,
            (UnderReview, Approved) => true,
            (UnderReview, Draft) => true,
            (Approved, Adopted) => true,
            (Draft | UnderReview | Approved, Archived) => true,
            _ => false,
        }
    }
}

// ==========================================
// 可见范围 (Visibility Scope)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisibilityScope {
    #[default]
    Private,      // 仅创建人
    Team,         // 所在团队
    Organization, // 全组织
}

impl fmt::Display for VisibilityScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl VisibilityScope {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TEAM" => VisibilityScope::Team,
            "ORGANIZATION" => VisibilityScope::Organization,
            _ => VisibilityScope::Private,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            VisibilityScope::Private => "PRIVATE",
            VisibilityScope::Team => "TEAM",
            VisibilityScope::Organization => "ORGANIZATION",
        }
    }
}

// ==========================================
// 优先级分档 (Priority Band)
// ==========================================
// 顺序: Critical > High > Medium > Low
// 杠杆 JSON 使用小写 (critical/high/medium/low)，同时兼容大写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBand {
    #[serde(alias = "CRITICAL")]
    Critical, // 关键
    #[serde(alias = "HIGH")]
    High, // 高
    #[serde(alias = "MEDIUM")]
    Medium, // 中
    #[serde(alias = "LOW")]
    Low, // 低
}

impl fmt::Display for PriorityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

impl PriorityBand {
    /// 全部分档（按优先级从高到低）
    pub const ALL: [PriorityBand; 4] = [
        PriorityBand::Critical,
        PriorityBand::High,
        PriorityBand::Medium,
        PriorityBand::Low,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CRITICAL" => Some(PriorityBand::Critical),
            "HIGH" => Some(PriorityBand::High),
            "MEDIUM" => Some(PriorityBand::Medium),
            "LOW" => Some(PriorityBand::Low),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            PriorityBand::Critical => "CRITICAL",
            PriorityBand::High => "HIGH",
            PriorityBand::Medium => "MEDIUM",
            PriorityBand::Low => "LOW",
        }
    }
}

// ==========================================
// 预算类型 (Budget Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    #[serde(alias = "PERCENTAGE")]
    Percentage, // 基准总成本的百分比
    #[serde(alias = "ABSOLUTE")]
    Absolute, // 绝对金额
}

impl fmt::Display for BudgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetType::Percentage => write!(f, "PERCENTAGE"),
            BudgetType::Absolute => write!(f, "ABSOLUTE"),
        }
    }
}

// ==========================================
// 削减遍历策略 (Cut Traversal)
// ==========================================
// PERSISTED: 严格按 line_no 遍历（默认）
// DECLARED_INTENT: 按 cutOrder / cutAbroadFirst 稳定预排序后遍历
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CutTraversal {
    #[default]
    Persisted,
    DeclaredIntent,
}

impl CutTraversal {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PERSISTED" => Some(CutTraversal::Persisted),
            "DECLARED_INTENT" => Some(CutTraversal::DeclaredIntent),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            CutTraversal::Persisted => "PERSISTED",
            CutTraversal::DeclaredIntent => "DECLARED_INTENT",
        }
    }
}

// ==========================================
// 导出列组 (Export Column Group)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportColumnGroup {
    Baseline, // 基准人数/班次/成本
    Deltas,   // 情景相对基准的变化
    Costs,    // 人均成本/情景成本
}

impl ExportColumnGroup {
    pub const ALL: [ExportColumnGroup; 3] = [
        ExportColumnGroup::Baseline,
        ExportColumnGroup::Deltas,
        ExportColumnGroup::Costs,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "BASELINE" => Some(ExportColumnGroup::Baseline),
            "DELTAS" => Some(ExportColumnGroup::Deltas),
            "COSTS" => Some(ExportColumnGroup::Costs),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ExportColumnGroup::Baseline => "BASELINE",
            ExportColumnGroup::Deltas => "DELTAS",
            ExportColumnGroup::Costs => "COSTS",
        }
    }
}
