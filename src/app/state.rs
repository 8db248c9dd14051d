// ==========================================
// 培训管理系统 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::ScenarioApi;
use crate::config::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection, read_schema_version};
use crate::engine::{
    AdjustmentHandler, ExportService, LifecycleService, PromotionHandler, RecalcEngine,
    ScenarioLockRegistry, SnapshotBuilder,
};
use crate::repository::{ActionLogRepository, ScenarioRepository, TrainingPlanRepository};

/// 应用状态
///
/// 所有仓储共享同一个数据库连接，所有写入情景的引擎共享同一把情景锁注册表。
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 预算情景API
    pub scenario_api: Arc<ScenarioApi>,

    /// 培训计划仓储（基准计划录入、采纳结果查询）
    pub plan_repo: Arc<TrainingPlanRepository>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 情景锁注册表（与各引擎共享）
    pub scenario_locks: Arc<ScenarioLockRegistry>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并幂等建表
    /// 2. 初始化所有Repository
    /// 3. 初始化所有Engine并组装API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let schema_version =
            read_schema_version(&conn).map_err(|e| format!("读取schema版本失败: {}", e))?;
        tracing::info!(schema_version = ?schema_version, "数据库结构已就绪");
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let plan_repo = Arc::new(TrainingPlanRepository::new(conn.clone()));
        let scenario_repo = Arc::new(ScenarioRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let locks = Arc::new(ScenarioLockRegistry::new());

        let snapshot_builder = Arc::new(SnapshotBuilder::new(
            plan_repo.clone(),
            scenario_repo.clone(),
            action_log_repo.clone(),
            config_manager.clone(),
        ));
        let recalc_engine = Arc::new(RecalcEngine::new(
            scenario_repo.clone(),
            action_log_repo.clone(),
            config_manager.clone(),
            locks.clone(),
        ));
        let adjustment_handler = Arc::new(AdjustmentHandler::new(
            scenario_repo.clone(),
            action_log_repo.clone(),
            locks.clone(),
        ));
        let promotion_handler = Arc::new(PromotionHandler::new(
            scenario_repo.clone(),
            action_log_repo.clone(),
            locks.clone(),
        ));
        let lifecycle = Arc::new(LifecycleService::new(
            scenario_repo.clone(),
            action_log_repo.clone(),
            locks.clone(),
        ));
        let export_service = Arc::new(ExportService::new(
            scenario_repo.clone(),
            action_log_repo.clone(),
        ));

        // ==========================================
        // 初始化API层
        // ==========================================
        let scenario_api = Arc::new(ScenarioApi::new(
            scenario_repo,
            action_log_repo,
            config_manager.clone(),
            snapshot_builder,
            recalc_engine,
            adjustment_handler,
            promotion_handler,
            lifecycle,
            export_service,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            scenario_api,
            plan_repo,
            config_manager,
            scenario_locks: locks,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 `TRAINING_SCENARIO_DB_PATH`，否则放在用户数据目录下。
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("TRAINING_SCENARIO_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./training_scenario.db");

    if let Some(data_dir) = dirs::data_dir() {
        #[cfg(debug_assertions)]
        {
            path = data_dir.join("training-scenario-dev");
        }

        #[cfg(not(debug_assertions))]
        {
            path = data_dir.join("training-scenario");
        }

        // 目录创建失败时回退为后续 open 报错
        std::fs::create_dir_all(&path).ok();
        path = path.join("training_scenario.db");
    }

    path.to_string_lossy().to_string()
}
