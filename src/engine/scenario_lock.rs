// ==========================================
// 培训管理系统 - 情景级互斥锁
// ==========================================
// 职责: 同一进程内按 scenario_id 串行化 重算 / 调整 / 采纳
// 说明: 跨进程写入由 revision 乐观锁兜底
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct ScenarioLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ScenarioLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得指定情景的锁句柄（不存在则创建）
    ///
    /// 调用方在句柄上 `lock()`，持有守卫期间完成整次读-算-写。
    pub fn handle(&self, scenario_id: &str) -> RepositoryResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(locks
            .entry(scenario_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// 回收锁句柄（情景删除或进入终态后调用）
    ///
    /// 已取得旧句柄的等待者仍在旧锁上串行，之后读到终态会被拒绝。
    pub fn release(&self, scenario_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.remove(scenario_id);
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 在情景锁内执行闭包
///
/// 锁中毒（前一持有者 panic）时仍继续执行：锁只保护顺序，数据一致性由事务保证。
pub fn with_scenario_lock<T, E, F>(
    registry: &ScenarioLockRegistry,
    scenario_id: &str,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<RepositoryError>,
{
    let handle = registry.handle(scenario_id)?;
    let _guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}
