use crate::db::DATETIME_FMT;
use crate::domain::levers::LeverConfig;
use crate::domain::scenario::{ScenarioTotals, ScenarioWorkspace, SNAPSHOT_COMPLETE_PROGRESS, SNAPSHOT_FAILED_PROGRESS};
use crate::domain::types::{ScenarioStatus, VisibilityScope};
use crate::repository::error::{
    invalid_enum_column, parse_datetime_column, RepositoryError, RepositoryResult,
};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub(super) const WORKSPACE_COLUMNS: &str = r#"scenario_id, name, description, status, owner,
       visibility_scope, basis_plan_id, basis_plan_version,
       baseline_total_cost, scenario_total_cost,
       baseline_total_participants, scenario_total_participants,
       levers_json, creation_progress, promoted_to_plan_id,
       last_recalculation_at, created_at, updated_at, revision"#;

// ==========================================
// ScenarioQuery - 情景列表过滤条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ScenarioQuery {
    pub status: Option<ScenarioStatus>,
    pub owner: Option<String>,
    pub basis_plan_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ==========================================
// ScenarioRepository - 情景仓储
// ==========================================
pub struct ScenarioRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ScenarioRepository {
    /// 创建新的ScenarioRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 工作区写入
    // ==========================================

    /// 插入情景工作区
    pub fn insert_workspace(&self, ws: &ScenarioWorkspace) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let levers_json = ws.levers.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            r#"INSERT INTO scenario_workspace (
                scenario_id, name, description, status, owner,
                visibility_scope, basis_plan_id, basis_plan_version,
                baseline_total_cost, scenario_total_cost,
                baseline_total_participants, scenario_total_participants,
                levers_json, creation_progress, promoted_to_plan_id,
                last_recalculation_at, created_at, updated_at, revision
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &ws.scenario_id,
                &ws.name,
                &ws.description,
                ws.status.to_db_str(),
                &ws.owner,
                ws.visibility_scope.to_db_str(),
                &ws.basis_plan_id,
                &ws.basis_plan_version,
                &ws.baseline_total_cost,
                &ws.scenario_total_cost,
                &ws.baseline_total_participants,
                &ws.scenario_total_participants,
                levers_json,
                &ws.creation_progress,
                &ws.promoted_to_plan_id,
                ws.last_recalculation_at.map(|t| t.format(DATETIME_FMT).to_string()),
                ws.created_at.format(DATETIME_FMT).to_string(),
                ws.updated_at.format(DATETIME_FMT).to_string(),
                &ws.revision,
            ],
        )?;

        Ok(ws.scenario_id.clone())
    }

    /// 更新快照复制进度（仅 CREATING 状态有效）
    ///
    /// 快照期间复制任务是唯一写入方，不做 revision 校验。
    pub fn update_progress(&self, scenario_id: &str, progress: i32) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE scenario_workspace
               SET creation_progress = ?1, updated_at = ?2
               WHERE scenario_id = ?3 AND status = 'CREATING'"#,
            params![progress, now_text(), scenario_id],
        )?;
        Ok(rows)
    }

    /// 快照复制完成: CREATING -> DRAFT, 进度 100, 聚合值 = 基准合计
    pub fn complete_snapshot(
        &self,
        scenario_id: &str,
        totals: &ScenarioTotals,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE scenario_workspace
               SET status = 'DRAFT',
                   creation_progress = ?1,
                   baseline_total_cost = ?2,
                   scenario_total_cost = ?3,
                   baseline_total_participants = ?4,
                   scenario_total_participants = ?5,
                   updated_at = ?6,
                   revision = revision + 1
               WHERE scenario_id = ?7 AND status = 'CREATING'"#,
            params![
                SNAPSHOT_COMPLETE_PROGRESS,
                totals.baseline_total_cost,
                totals.scenario_total_cost,
                totals.baseline_total_participants,
                totals.scenario_total_participants,
                now_text(),
                scenario_id,
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::InvalidStateTransition {
                from: self.status_text_locked(&conn, scenario_id)?,
                to: ScenarioStatus::Draft.to_db_str().to_string(),
            });
        }
        Ok(())
    }

    /// 快照复制失败: 进度置为失败标记，状态回到 DRAFT 供用户删除
    pub fn fail_snapshot(&self, scenario_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE scenario_workspace
               SET status = 'DRAFT',
                   creation_progress = ?1,
                   updated_at = ?2,
                   revision = revision + 1
               WHERE scenario_id = ?3 AND status = 'CREATING'"#,
            params![SNAPSHOT_FAILED_PROGRESS, now_text(), scenario_id],
        )?;
        Ok(rows)
    }

    /// 状态流转（带乐观锁）
    ///
    /// # 返回
    /// - `Ok(new_revision)`: 成功
    /// - `Err(OptimisticLockFailure)`: revision 不匹配
    pub fn update_status(
        &self,
        scenario_id: &str,
        expected_revision: i32,
        next: ScenarioStatus,
    ) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"UPDATE scenario_workspace
               SET status = ?1, updated_at = ?2, revision = revision + 1
               WHERE scenario_id = ?3 AND revision = ?4"#,
            params![next.to_db_str(), now_text(), scenario_id, expected_revision],
        )?;

        if rows == 0 {
            return Err(lock_failure(&conn, scenario_id, expected_revision)?);
        }
        Ok(expected_revision + 1)
    }

    /// 删除情景（明细随外键级联删除）
    pub fn delete(&self, scenario_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM scenario_workspace WHERE scenario_id = ?",
            params![scenario_id],
        )?;
        Ok(rows)
    }

    // ==========================================
    // 工作区查询
    // ==========================================

    /// 按scenario_id查询情景
    pub fn find_by_id(&self, scenario_id: &str) -> RepositoryResult<Option<ScenarioWorkspace>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM scenario_workspace WHERE scenario_id = ?",
            WORKSPACE_COLUMNS
        );
        let ws = conn
            .query_row(&sql, params![scenario_id], map_workspace_row)
            .optional()?;
        Ok(ws)
    }

    /// 按条件列出情景（按 created_at 降序）
    pub fn list(&self, query: &ScenarioQuery) -> RepositoryResult<Vec<ScenarioWorkspace>> {
        let conn = self.get_conn()?;
        let (where_sql, mut values) = build_filter(query);

        let mut sql = format!(
            "SELECT {} FROM scenario_workspace{} ORDER BY created_at DESC, scenario_id",
            WORKSPACE_COLUMNS, where_sql
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(rusqlite::types::Value::Integer(limit));
            values.push(rusqlite::types::Value::Integer(query.offset.unwrap_or(0)));
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), map_workspace_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 按条件统计情景数量（忽略分页）
    pub fn count(&self, query: &ScenarioQuery) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let (where_sql, values) = build_filter(query);
        let sql = format!("SELECT COUNT(*) FROM scenario_workspace{}", where_sql);
        let count: i64 = conn.query_row(
            &sql,
            rusqlite::params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn status_text_locked(&self, conn: &Connection, scenario_id: &str) -> RepositoryResult<String> {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM scenario_workspace WHERE scenario_id = ?",
                params![scenario_id],
                |row| row.get(0),
            )
            .optional()?;
        status.ok_or_else(|| not_found(scenario_id))
    }
}

/// revision 不匹配时读取实际 revision，构造锁冲突（记录不存在则返回 NotFound）
pub(super) fn lock_failure(
    conn: &Connection,
    scenario_id: &str,
    expected_revision: i32,
) -> RepositoryResult<RepositoryError> {
    let actual: Option<i32> = conn
        .query_row(
            "SELECT revision FROM scenario_workspace WHERE scenario_id = ?",
            params![scenario_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match actual {
        Some(actual) => RepositoryError::OptimisticLockFailure {
            scenario_id: scenario_id.to_string(),
            expected: expected_revision,
            actual,
        },
        None => not_found(scenario_id),
    })
}

pub(super) fn not_found(scenario_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "ScenarioWorkspace".to_string(),
        id: scenario_id.to_string(),
    }
}

pub(super) fn now_text() -> String {
    chrono::Local::now().naive_local().format(DATETIME_FMT).to_string()
}

fn build_filter(query: &ScenarioQuery) -> (String, Vec<rusqlite::types::Value>) {
    use rusqlite::types::Value;

    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(status) = query.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.to_db_str().to_string()));
    }
    if let Some(owner) = query.owner.as_deref() {
        clauses.push("owner = ?");
        values.push(Value::Text(owner.to_string()));
    }
    if let Some(plan_id) = query.basis_plan_id.as_deref() {
        clauses.push("basis_plan_id = ?");
        values.push(Value::Text(plan_id.to_string()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, values)
}

/// 映射数据库行到ScenarioWorkspace对象
pub(super) fn map_workspace_row(row: &Row) -> SqliteResult<ScenarioWorkspace> {
    let status_raw: String = row.get(3)?;
    let status = ScenarioStatus::parse(&status_raw).ok_or_else(|| invalid_enum_column(3, &status_raw))?;

    let levers_raw: Option<String> = row.get(12)?;
    let levers = match levers_raw {
        Some(raw) => Some(serde_json::from_str::<LeverConfig>(&raw).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(12, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    let last_recalc_raw: Option<String> = row.get(15)?;
    let last_recalculation_at = match last_recalc_raw {
        Some(raw) => Some(parse_datetime_column(15, &raw)?),
        None => None,
    };

    Ok(ScenarioWorkspace {
        scenario_id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status,
        owner: row.get(4)?,
        visibility_scope: VisibilityScope::parse(&row.get::<_, String>(5)?),
        basis_plan_id: row.get(6)?,
        basis_plan_version: row.get(7)?,
        baseline_total_cost: row.get(8)?,
        scenario_total_cost: row.get(9)?,
        baseline_total_participants: row.get(10)?,
        scenario_total_participants: row.get(11)?,
        levers,
        creation_progress: row.get(13)?,
        promoted_to_plan_id: row.get(14)?,
        last_recalculation_at,
        created_at: parse_datetime_column(16, &row.get::<_, String>(16)?)?,
        updated_at: parse_datetime_column(17, &row.get::<_, String>(17)?)?,
        revision: row.get(18)?,
    })
}
