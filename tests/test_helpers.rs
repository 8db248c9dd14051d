// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、基准计划种子数据、情景快速建立
// ==========================================

#![allow(dead_code)]

use std::error::Error;

use tempfile::NamedTempFile;
use training_scenario::app::AppState;
use training_scenario::domain::{ScenarioWorkspace, TrainingPlan, TrainingPlanLine};
use training_scenario::PriorityBand;

/// 测试操作人
pub const TEST_ACTOR: &str = "tester";

/// 计划明细种子
#[derive(Debug, Clone)]
pub struct LineSeed {
    pub course_id: &'static str,
    pub band: PriorityBand,
    pub volume: i64,
    pub sessions: i64,
    pub cost_per_participant: f64,
    pub entity_id: Option<&'static str>,
    pub category_id: Option<&'static str>,
    pub is_protected: bool,
    pub is_abroad: bool,
}

impl LineSeed {
    pub fn new(course_id: &'static str, band: PriorityBand, volume: i64, cpp: f64) -> Self {
        Self {
            course_id,
            band,
            volume,
            sessions: 1,
            cost_per_participant: cpp,
            entity_id: None,
            category_id: None,
            is_protected: false,
            is_abroad: false,
        }
    }

    pub fn protected(mut self) -> Self {
        self.is_protected = true;
        self
    }

    pub fn abroad(mut self) -> Self {
        self.is_abroad = true;
        self
    }

    pub fn entity(mut self, entity_id: &'static str) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn category(mut self, category_id: &'static str) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn sessions(mut self, sessions: i64) -> Self {
        self.sessions = sessions;
        self
    }
}

/// 创建临时数据库文件（需要保持 NamedTempFile 存活）
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是有效UTF-8")?
        .to_string();
    Ok((temp_file, db_path))
}

/// 在临时数据库上组装完整应用状态
pub fn create_test_state() -> (NamedTempFile, AppState) {
    training_scenario::logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let state = AppState::new(db_path).expect("初始化AppState失败");
    (temp_file, state)
}

/// 写入基准计划（version = 1）
pub fn seed_plan(state: &AppState, name: &str, seeds: &[LineSeed]) -> TrainingPlan {
    let now = chrono::Local::now().naive_local();
    let plan_id = uuid::Uuid::new_v4().to_string();

    let lines: Vec<TrainingPlanLine> = seeds
        .iter()
        .enumerate()
        .map(|(idx, seed)| TrainingPlanLine {
            line_id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.clone(),
            line_no: idx as i32 + 1,
            course_id: seed.course_id.to_string(),
            course_name: format!("课程{}", seed.course_id),
            entity_id: seed.entity_id.map(str::to_string),
            category_id: seed.category_id.map(str::to_string),
            volume: seed.volume,
            sessions: seed.sessions,
            cost: seed.volume as f64 * seed.cost_per_participant,
            priority_band: seed.band,
            is_protected: seed.is_protected,
            is_abroad: seed.is_abroad,
        })
        .collect();

    let plan = TrainingPlan {
        plan_id,
        plan_name: name.to_string(),
        description: None,
        version: 1,
        total_budget: lines.iter().map(|l| l.cost).sum(),
        total_participants: lines.iter().map(|l| l.volume).sum(),
        source_scenario_id: None,
        created_by: TEST_ACTOR.to_string(),
        created_at: now,
        updated_at: now,
    };

    state
        .plan_repo
        .create_with_lines(&plan, &lines)
        .expect("写入基准计划失败");
    plan
}

/// 建立情景（无 Tokio 运行时时同步完成快照）
pub fn create_scenario(state: &AppState, plan: &TrainingPlan, name: &str) -> ScenarioWorkspace {
    let ws = state
        .scenario_api
        .create_scenario(&plan.plan_id, plan.version, name, None, None, TEST_ACTOR)
        .expect("创建情景失败");
    assert_eq!(ws.creation_progress, 100, "快照应同步完成");
    ws
}

/// 三行示例计划: A(medium,100人,$100) / B(critical,保护,50人,$200) / C(low,20人,$50)
pub fn example_seeds() -> Vec<LineSeed> {
    vec![
        LineSeed::new("A", PriorityBand::Medium, 100, 100.0),
        LineSeed::new("B", PriorityBand::Critical, 50, 200.0).protected(),
        LineSeed::new("C", PriorityBand::Low, 20, 50.0),
    ]
}

/// 浮点近似比较
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}
