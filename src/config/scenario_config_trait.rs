// ==========================================
// 培训管理系统 - 情景配置读取 Trait
// ==========================================
// 职责: 定义情景引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{CutTraversal, ExportColumnGroup};
use std::error::Error;

// ==========================================
// ScenarioConfigReader Trait
// ==========================================
// 用途: 快照复制 / 重算 / 导出所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait ScenarioConfigReader: Send + Sync {
    /// 获取快照复制批大小
    ///
    /// # 默认值
    /// - 500（配置值 < 1 或无法解析时回退）
    fn get_snapshot_batch_size(&self) -> Result<usize, Box<dyn Error>>;

    /// 获取削减遍历策略
    ///
    /// # 返回
    /// - CutTraversal::Persisted: 按持久化顺序遍历
    /// - CutTraversal::DeclaredIntent: 按 cutOrder / cutAbroadFirst 预排序
    ///
    /// # 默认值
    /// - PERSISTED
    fn get_cut_traversal(&self) -> Result<CutTraversal, Box<dyn Error>>;

    /// 获取导出默认列组
    ///
    /// # 默认值
    /// - BASELINE,DELTAS,COSTS
    fn get_export_default_groups(&self) -> Result<Vec<ExportColumnGroup>, Box<dyn Error>>;
}
