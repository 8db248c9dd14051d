// ==========================================
// 培训管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::scenario_config_trait::ScenarioConfigReader;
use crate::domain::types::{CutTraversal, ExportColumnGroup};
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// 快照复制默认批大小
pub const DEFAULT_SNAPSHOT_BATCH_SIZE: usize = 500;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let key = key.trim();
        if key.is_empty() {
            return Err("配置键不能为空".into());
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self.get_config_value(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 每次重算时随审计日志一起记录，便于复现
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key"
        )?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// ScenarioConfigReader Trait 实现
// ==========================================
impl ScenarioConfigReader for ConfigManager {
    fn get_snapshot_batch_size(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(
            config_keys::SNAPSHOT_BATCH_SIZE,
            &DEFAULT_SNAPSHOT_BATCH_SIZE.to_string(),
        )?;
        match value.trim().parse::<usize>() {
            Ok(size) if size >= 1 => Ok(size),
            _ => {
                tracing::warn!(
                    config_key = config_keys::SNAPSHOT_BATCH_SIZE,
                    raw_value = %value,
                    "快照批大小配置无效，使用默认值"
                );
                Ok(DEFAULT_SNAPSHOT_BATCH_SIZE)
            }
        }
    }

    fn get_cut_traversal(&self) -> Result<CutTraversal, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::CUT_TRAVERSAL, "PERSISTED")?;
        Ok(CutTraversal::parse(&value).unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::CUT_TRAVERSAL,
                raw_value = %value,
                "削减遍历策略配置无效，使用 PERSISTED"
            );
            CutTraversal::Persisted
        }))
    }

    fn get_export_default_groups(&self) -> Result<Vec<ExportColumnGroup>, Box<dyn Error>> {
        let value =
            self.get_config_or_default(config_keys::EXPORT_DEFAULT_GROUPS, "BASELINE,DELTAS,COSTS")?;

        let mut groups: Vec<ExportColumnGroup> = Vec::new();
        for group in value.split(',').filter_map(ExportColumnGroup::parse) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }

        if groups.is_empty() {
            Ok(ExportColumnGroup::ALL.to_vec())
        } else {
            Ok(groups)
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 快照复制
    pub const SNAPSHOT_BATCH_SIZE: &str = "scenario/snapshot_batch_size";

    // 分配引擎
    pub const CUT_TRAVERSAL: &str = "scenario/cut_traversal";

    // 导出
    pub const EXPORT_DEFAULT_GROUPS: &str = "scenario/export_default_groups";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_defaults_when_unset() {
        let manager = setup_manager();
        assert_eq!(manager.get_snapshot_batch_size().unwrap(), 500);
        assert_eq!(manager.get_cut_traversal().unwrap(), CutTraversal::Persisted);
        assert_eq!(
            manager.get_export_default_groups().unwrap(),
            ExportColumnGroup::ALL.to_vec()
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let manager = setup_manager();
        manager.set_global_config_value(config_keys::SNAPSHOT_BATCH_SIZE, "0").unwrap();
        manager.set_global_config_value(config_keys::CUT_TRAVERSAL, "RANDOM").unwrap();
        manager.set_global_config_value(config_keys::EXPORT_DEFAULT_GROUPS, "foo,bar").unwrap();

        assert_eq!(manager.get_snapshot_batch_size().unwrap(), 500);
        assert_eq!(manager.get_cut_traversal().unwrap(), CutTraversal::Persisted);
        assert_eq!(manager.get_export_default_groups().unwrap().len(), 3);
    }

    #[test]
    fn test_overrides_and_snapshot() {
        let manager = setup_manager();
        manager.set_global_config_value(config_keys::SNAPSHOT_BATCH_SIZE, "2").unwrap();
        manager.set_global_config_value(config_keys::CUT_TRAVERSAL, "declared_intent").unwrap();
        manager
            .set_global_config_value(config_keys::EXPORT_DEFAULT_GROUPS, "costs, costs,baseline")
            .unwrap();

        assert_eq!(manager.get_snapshot_batch_size().unwrap(), 2);
        assert_eq!(manager.get_cut_traversal().unwrap(), CutTraversal::DeclaredIntent);
        assert_eq!(
            manager.get_export_default_groups().unwrap(),
            vec![ExportColumnGroup::Costs, ExportColumnGroup::Baseline]
        );

        let snapshot = manager.get_config_snapshot().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed[config_keys::SNAPSHOT_BATCH_SIZE], "2");
        assert_eq!(parsed.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_blank_key_rejected() {
        let manager = setup_manager();
        assert!(manager.set_global_config_value("  ", "x").is_err());
    }
}
