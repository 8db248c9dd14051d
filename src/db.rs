// ==========================================
// 培训管理系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表，保证新库/测试库结构一致
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 时间戳文本格式（所有表统一）
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等创建全部表与索引，并登记 schema_version
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS training_plan (
            plan_id TEXT PRIMARY KEY,
            plan_name TEXT NOT NULL,
            description TEXT,
            version INTEGER NOT NULL DEFAULT 1,
            total_budget REAL NOT NULL DEFAULT 0,
            total_participants INTEGER NOT NULL DEFAULT 0,
            source_scenario_id TEXT,
            created_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS training_plan_line (
            line_id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL REFERENCES training_plan(plan_id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            course_id TEXT NOT NULL,
            course_name TEXT NOT NULL,
            entity_id TEXT,
            category_id TEXT,
            volume INTEGER NOT NULL,
            sessions INTEGER NOT NULL DEFAULT 0,
            cost REAL NOT NULL,
            priority_band TEXT NOT NULL,
            is_protected INTEGER NOT NULL DEFAULT 0,
            is_abroad INTEGER NOT NULL DEFAULT 0,
            UNIQUE(plan_id, line_no)
        );

        CREATE INDEX IF NOT EXISTS idx_plan_line_plan ON training_plan_line(plan_id, line_no);

        CREATE TABLE IF NOT EXISTS scenario_workspace (
            scenario_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL CHECK(status IN ('CREATING', 'DRAFT', 'UNDER_REVIEW', 'APPROVED', 'ADOPTED', 'ARCHIVED')),
            owner TEXT NOT NULL,
            visibility_scope TEXT NOT NULL DEFAULT 'PRIVATE',
            basis_plan_id TEXT NOT NULL REFERENCES training_plan(plan_id),
            basis_plan_version INTEGER NOT NULL,
            baseline_total_cost REAL NOT NULL DEFAULT 0,
            scenario_total_cost REAL NOT NULL DEFAULT 0,
            baseline_total_participants INTEGER NOT NULL DEFAULT 0,
            scenario_total_participants INTEGER NOT NULL DEFAULT 0,
            levers_json TEXT,
            creation_progress INTEGER NOT NULL DEFAULT 0,
            promoted_to_plan_id TEXT REFERENCES training_plan(plan_id),
            last_recalculation_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            revision INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_scenario_status ON scenario_workspace(status);
        CREATE INDEX IF NOT EXISTS idx_scenario_owner ON scenario_workspace(owner);

        CREATE TABLE IF NOT EXISTS scenario_line_item (
            line_id TEXT PRIMARY KEY,
            scenario_id TEXT NOT NULL REFERENCES scenario_workspace(scenario_id) ON DELETE CASCADE,
            line_no INTEGER NOT NULL,
            source_line_id TEXT,
            course_id TEXT NOT NULL,
            course_name TEXT NOT NULL,
            entity_id TEXT,
            category_id TEXT,
            baseline_volume INTEGER NOT NULL,
            baseline_sessions INTEGER NOT NULL,
            baseline_cost REAL NOT NULL,
            baseline_cost_per_participant REAL NOT NULL,
            scenario_volume INTEGER NOT NULL,
            scenario_sessions INTEGER NOT NULL,
            scenario_cost REAL NOT NULL,
            priority_band TEXT NOT NULL,
            is_protected INTEGER NOT NULL DEFAULT 0,
            is_abroad INTEGER NOT NULL DEFAULT 0,
            is_locally_adjusted INTEGER NOT NULL DEFAULT 0,
            local_adjustment_reason TEXT,
            adjusted_by TEXT,
            adjusted_at TEXT,
            is_cut INTEGER NOT NULL DEFAULT 0,
            UNIQUE(scenario_id, line_no)
        );

        CREATE INDEX IF NOT EXISTS idx_scenario_line_order ON scenario_line_item(scenario_id, line_no);

        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            scenario_id TEXT,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_action_log_scenario ON action_log(scenario_id, action_ts DESC);
        CREATE INDEX IF NOT EXISTS idx_action_log_ts ON action_log(action_ts DESC);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}
