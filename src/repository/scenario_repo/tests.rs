use super::{LineItemQuery, ScenarioQuery, ScenarioRepository};
use crate::domain::levers::LeverConfig;
use crate::domain::plan::{TrainingPlan, TrainingPlanLine};
use crate::domain::scenario::{LineAdjustment, ScenarioLineItem, ScenarioTotals, ScenarioWorkspace};
use crate::domain::types::{PriorityBand, ScenarioStatus, VisibilityScope};
use crate::repository::error::RepositoryError;
use crate::repository::plan_repo::TrainingPlanRepository;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn seed_basis_plan(conn: &Arc<Mutex<Connection>>) {
    let plan = TrainingPlan {
        plan_id: "P1".to_string(),
        plan_name: "基准计划".to_string(),
        description: None,
        version: 1,
        total_budget: 0.0,
        total_participants: 0,
        source_scenario_id: None,
        created_by: "admin".to_string(),
        created_at: now(),
        updated_at: now(),
    };
    TrainingPlanRepository::new(conn.clone()).create(&plan).unwrap();
}

fn make_workspace(scenario_id: &str, status: ScenarioStatus) -> ScenarioWorkspace {
    ScenarioWorkspace {
        scenario_id: scenario_id.to_string(),
        name: format!("情景 {}", scenario_id),
        description: None,
        status,
        owner: "alice".to_string(),
        visibility_scope: VisibilityScope::Team,
        basis_plan_id: "P1".to_string(),
        basis_plan_version: 1,
        baseline_total_cost: 0.0,
        scenario_total_cost: 0.0,
        baseline_total_participants: 0,
        scenario_total_participants: 0,
        levers: None,
        creation_progress: 0,
        promoted_to_plan_id: None,
        last_recalculation_at: None,
        created_at: now(),
        updated_at: now(),
        revision: 1,
    }
}

fn make_line(scenario_id: &str, line_no: i32, volume: i64, cost: f64) -> ScenarioLineItem {
    ScenarioLineItem {
        line_id: format!("{}-L{}", scenario_id, line_no),
        scenario_id: scenario_id.to_string(),
        line_no,
        source_line_id: None,
        course_id: format!("C{}", line_no),
        course_name: format!("课程{}", line_no),
        entity_id: None,
        category_id: None,
        baseline_volume: volume,
        baseline_sessions: 2,
        baseline_cost: cost,
        baseline_cost_per_participant: cost / volume as f64,
        scenario_volume: volume,
        scenario_sessions: 2,
        scenario_cost: cost,
        priority_band: PriorityBand::Low,
        is_protected: false,
        is_abroad: false,
        adjustment: LineAdjustment::Engine,
        is_cut: false,
    }
}

/// 建立一个已完成快照的 DRAFT 情景（revision = 2）
fn seed_draft(repo: &ScenarioRepository, conn: &Arc<Mutex<Connection>>) {
    seed_basis_plan(conn);
    repo.insert_workspace(&make_workspace("S1", ScenarioStatus::Creating)).unwrap();
    let lines = vec![make_line("S1", 1, 10, 1000.0), make_line("S1", 2, 20, 1000.0)];
    repo.insert_lines_batch(&lines).unwrap();
    repo.complete_snapshot("S1", &ScenarioTotals::from_lines(&lines)).unwrap();
}

#[test]
fn test_snapshot_lifecycle() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_basis_plan(&conn);

    repo.insert_workspace(&make_workspace("S1", ScenarioStatus::Creating)).unwrap();
    assert_eq!(repo.update_progress("S1", 50).unwrap(), 1);
    assert_eq!(repo.find_by_id("S1").unwrap().unwrap().creation_progress, 50);

    let lines = vec![make_line("S1", 1, 10, 1000.0)];
    repo.insert_lines_batch(&lines).unwrap();
    repo.complete_snapshot("S1", &ScenarioTotals::from_lines(&lines)).unwrap();

    let ws = repo.find_by_id("S1").unwrap().unwrap();
    assert_eq!(ws.status, ScenarioStatus::Draft);
    assert!(ws.is_snapshot_complete());
    assert_eq!(ws.baseline_total_cost, 1000.0);
    assert_eq!(ws.revision, 2);

    // 非 CREATING 不再接受进度/完成
    assert_eq!(repo.update_progress("S1", 10).unwrap(), 0);
    assert!(matches!(
        repo.complete_snapshot("S1", &ScenarioTotals::default()),
        Err(RepositoryError::InvalidStateTransition { .. })
    ));
}

#[test]
fn test_fail_snapshot_marks_progress() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_basis_plan(&conn);
    repo.insert_workspace(&make_workspace("S1", ScenarioStatus::Creating)).unwrap();

    assert_eq!(repo.fail_snapshot("S1").unwrap(), 1);
    let ws = repo.find_by_id("S1").unwrap().unwrap();
    assert!(ws.is_snapshot_failed());
    assert!(!ws.is_snapshot_complete());
    assert_eq!(ws.status, ScenarioStatus::Draft);
}

#[test]
fn test_commit_allocation_skips_locked_lines() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_draft(&repo, &conn);

    // 先锁定第 2 行
    let mut locked = repo.find_line("S1", "S1-L2").unwrap().unwrap();
    locked.scenario_volume = 5;
    locked.scenario_cost = 250.0;
    locked.is_cut = true;
    locked.adjustment = LineAdjustment::Locked {
        reason: Some("手工".to_string()),
        adjusted_by: "bob".to_string(),
        adjusted_at: now(),
    };
    let (rev, totals) = repo.commit_adjustment("S1", 2, &locked).unwrap();
    assert_eq!(rev, 3);
    // 第 1 行 10 人 1000 + 锁定行 5 人 250
    assert_eq!(totals.scenario_total_cost, 1250.0);
    assert_eq!(totals.scenario_total_participants, 15);
    assert_eq!(totals.baseline_total_participants, 30);

    // 引擎输出试图覆盖两行，锁定行必须保持不变
    let mut lines = repo.find_lines("S1").unwrap();
    for line in lines.iter_mut() {
        line.scenario_volume = 0;
        line.scenario_cost = 0.0;
        line.is_cut = true;
    }
    lines[1].adjustment = LineAdjustment::Engine;
    let rev = repo
        .commit_allocation("S1", 3, &lines, &LeverConfig::default(), now())
        .unwrap();
    assert_eq!(rev, 4);

    let stored = repo.find_lines("S1").unwrap();
    assert_eq!(stored[0].scenario_volume, 0);
    assert_eq!(stored[1].scenario_volume, 5);
    assert_eq!(stored[1].adjustment.reason(), Some("手工"));

    let ws = repo.find_by_id("S1").unwrap().unwrap();
    assert_eq!(ws.scenario_total_cost, 250.0);
    assert_eq!(ws.scenario_total_participants, 5);
    assert_eq!(ws.baseline_total_cost, 2000.0);
    assert!(ws.levers.is_some());
    assert!(ws.last_recalculation_at.is_some());
}

#[test]
fn test_stale_revision_rolls_back() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_draft(&repo, &conn);

    let mut lines = repo.find_lines("S1").unwrap();
    lines[0].scenario_volume = 1;
    lines[0].scenario_cost = 100.0;

    let err = repo
        .commit_allocation("S1", 1, &lines, &LeverConfig::default(), now())
        .unwrap_err();
    match err {
        RepositoryError::OptimisticLockFailure { expected, actual, .. } => {
            assert_eq!(expected, 1);
            assert_eq!(actual, 2);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 明细未被写入
    assert_eq!(repo.find_lines("S1").unwrap()[0].scenario_volume, 10);
}

#[test]
fn test_update_status_and_missing_scenario() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_draft(&repo, &conn);

    assert_eq!(repo.update_status("S1", 2, ScenarioStatus::UnderReview).unwrap(), 3);
    assert!(matches!(
        repo.update_status("S1", 2, ScenarioStatus::Approved),
        Err(RepositoryError::OptimisticLockFailure { .. })
    ));
    assert!(matches!(
        repo.update_status("missing", 1, ScenarioStatus::Approved),
        Err(RepositoryError::NotFound { .. })
    ));
}

#[test]
fn test_commit_promotion_requires_approved() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_draft(&repo, &conn);

    let plan = TrainingPlan {
        plan_id: "P2".to_string(),
        plan_name: "新计划".to_string(),
        description: None,
        version: 1,
        total_budget: 2000.0,
        total_participants: 30,
        source_scenario_id: Some("S1".to_string()),
        created_by: "alice".to_string(),
        created_at: now(),
        updated_at: now(),
    };
    let plan_line = TrainingPlanLine {
        line_id: "P2-L1".to_string(),
        plan_id: "P2".to_string(),
        line_no: 1,
        course_id: "C1".to_string(),
        course_name: "课程1".to_string(),
        entity_id: None,
        category_id: None,
        volume: 10,
        sessions: 2,
        cost: 1000.0,
        priority_band: PriorityBand::Low,
        is_protected: false,
        is_abroad: false,
    };

    // DRAFT 状态: 回滚，新计划不存在
    let err = repo
        .commit_promotion("S1", 2, &plan, std::slice::from_ref(&plan_line))
        .unwrap_err();
    assert!(matches!(err, RepositoryError::BusinessRuleViolation(_)));
    let plans = TrainingPlanRepository::new(conn.clone());
    assert!(plans.find_by_id("P2").unwrap().is_none());

    repo.update_status("S1", 2, ScenarioStatus::UnderReview).unwrap();
    repo.update_status("S1", 3, ScenarioStatus::Approved).unwrap();
    assert_eq!(
        repo.commit_promotion("S1", 4, &plan, std::slice::from_ref(&plan_line))
            .unwrap(),
        5
    );

    let ws = repo.find_by_id("S1").unwrap().unwrap();
    assert_eq!(ws.status, ScenarioStatus::Adopted);
    assert_eq!(ws.promoted_to_plan_id.as_deref(), Some("P2"));
    assert_eq!(plans.count_lines("P2").unwrap(), 1);
}

#[test]
fn test_list_filters_and_delete_cascade() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_draft(&repo, &conn);
    let mut other = make_workspace("S2", ScenarioStatus::Creating);
    other.owner = "bob".to_string();
    repo.insert_workspace(&other).unwrap();

    assert_eq!(repo.count(&ScenarioQuery::default()).unwrap(), 2);
    let drafts = repo
        .list(&ScenarioQuery {
            status: Some(ScenarioStatus::Draft),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].scenario_id, "S1");

    let bobs = repo
        .list(&ScenarioQuery {
            owner: Some("bob".to_string()),
            basis_plan_id: Some("P1".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(bobs.len(), 1);

    let page = repo
        .list(&ScenarioQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.len(), 1);

    assert_eq!(repo.delete("S1").unwrap(), 1);
    assert_eq!(repo.count_lines_filtered("S1", &LineItemQuery::default()).unwrap(), 0);
    assert!(repo.find_by_id("S1").unwrap().is_none());
}

#[test]
fn test_line_filters() {
    let conn = setup_test_db();
    let repo = ScenarioRepository::new(conn.clone());
    seed_basis_plan(&conn);
    repo.insert_workspace(&make_workspace("S1", ScenarioStatus::Creating)).unwrap();

    let mut lines: Vec<_> = (1..=4).map(|n| make_line("S1", n, 10, 100.0)).collect();
    lines[0].priority_band = PriorityBand::Critical;
    lines[1].is_cut = true;
    lines[3].is_cut = true;
    repo.insert_lines_batch(&lines).unwrap();

    let cut = LineItemQuery {
        cut_only: true,
        ..Default::default()
    };
    assert_eq!(repo.count_lines_filtered("S1", &cut).unwrap(), 2);
    let cut_lines = repo.find_lines_filtered("S1", &cut).unwrap();
    assert_eq!(cut_lines.iter().map(|l| l.line_no).collect::<Vec<_>>(), vec![2, 4]);

    let critical = LineItemQuery {
        priority_band: Some(PriorityBand::Critical),
        ..Default::default()
    };
    assert_eq!(repo.find_lines_filtered("S1", &critical).unwrap().len(), 1);

    let second_page = LineItemQuery {
        limit: Some(2),
        offset: Some(2),
        ..Default::default()
    };
    let page = repo.find_lines_filtered("S1", &second_page).unwrap();
    assert_eq!(page[0].line_no, 3);
    assert_eq!(repo.count_lines_filtered("S1", &second_page).unwrap(), 4);
}
