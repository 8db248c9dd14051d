use crate::db::DATETIME_FMT;
use crate::domain::action_log::ActionLog;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// ActionLogRepository - 审计日志仓储
// ==========================================
// 只追加，不提供更新/删除
pub struct ActionLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ActionLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 追加一条审计记录，返回 action_id
    ///
    /// 调用方在业务事务提交之后写入；失败由调用方记录告警，不回滚业务写入。
    pub fn insert(&self, log: &ActionLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let payload = log.payload_json.as_ref().map(|v| v.to_string());

        conn.execute(
            r#"INSERT INTO action_log (
                   action_id, scenario_id, action_type, action_ts, actor,
                   payload_json, detail
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &log.action_id,
                &log.scenario_id,
                &log.action_type,
                log.action_ts.format(DATETIME_FMT).to_string(),
                &log.actor,
                payload,
                &log.detail,
            ],
        )?;

        Ok(log.action_id.clone())
    }
}
