// ==========================================
// 采纳与导出集成测试
// ==========================================
// 测试范围:
// 1. 审批流转 -> 采纳生成新计划（清零明细不带入）
// 2. 重复采纳被拒绝
// 3. 导出列组/仅削减过滤/CSV，导出不改变工作区
// 4. 分档摘要
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use test_helpers::{
    assert_close, create_scenario, create_test_state, example_seeds, seed_plan, TEST_ACTOR,
};
use training_scenario::api::ApiError;
use training_scenario::app::AppState;
use training_scenario::config::config_keys;
use training_scenario::domain::{ActionType, ScenarioWorkspace};
use training_scenario::{BudgetType, ExportColumnGroup, LeverConfig, PriorityBand, ScenarioStatus};

/// 建立一个按 15000 预算重算过的情景
fn recalculated_scenario(state: &AppState) -> ScenarioWorkspace {
    let plan = seed_plan(state, "年度计划", &example_seeds());
    let ws = create_scenario(state, &plan, "压缩方案");
    let levers = LeverConfig {
        global_budget_type: Some(BudgetType::Absolute),
        global_budget_value: Some(15000.0),
        ..Default::default()
    };
    state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
        .unwrap();
    state.scenario_api.get_scenario(&ws.scenario_id).unwrap()
}

fn approve(state: &AppState, scenario_id: &str) {
    state.scenario_api.submit_for_review(scenario_id, TEST_ACTOR).unwrap();
    state.scenario_api.approve(scenario_id, TEST_ACTOR).unwrap();
}

#[test]
fn test_promote_creates_plan_from_scenario() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);
    approve(&state, &ws.scenario_id);

    let result = state
        .scenario_api
        .promote(&ws.scenario_id, "压缩后计划", Some("2026年度".to_string()), TEST_ACTOR)
        .unwrap();

    assert_eq!(result.plan_lines, 2);
    assert_eq!(result.dropped_lines, 1);
    assert_close(result.total_budget, 20000.0);
    assert_eq!(result.total_participants, 150);

    let plan = state.plan_repo.find_by_id(&result.new_plan_id).unwrap().unwrap();
    assert_eq!(plan.plan_name, "压缩后计划");
    assert_eq!(plan.version, 1);
    assert_eq!(plan.source_scenario_id.as_deref(), Some(ws.scenario_id.as_str()));

    let lines = state.plan_repo.find_lines_by_plan(&result.new_plan_id).unwrap();
    let courses: Vec<&str> = lines.iter().map(|l| l.course_id.as_str()).collect();
    assert_eq!(courses, vec!["A", "B"]);
    assert!(lines.iter().all(|l| l.volume > 0));

    let adopted = state.scenario_api.get_scenario(&ws.scenario_id).unwrap();
    assert_eq!(adopted.status, ScenarioStatus::Adopted);
    assert!(state.scenario_locks.is_empty());
    assert_eq!(adopted.promoted_to_plan_id.as_deref(), Some(result.new_plan_id.as_str()));

    let trail = state.scenario_api.list_audit_trail(&ws.scenario_id).unwrap();
    assert_eq!(trail.last().and_then(|l| l.kind()), Some(ActionType::Promote));
}

#[test]
fn test_second_promotion_is_rejected() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);
    approve(&state, &ws.scenario_id);

    state
        .scenario_api
        .promote(&ws.scenario_id, "第一次", None, TEST_ACTOR)
        .unwrap();
    let err = state
        .scenario_api
        .promote(&ws.scenario_id, "第二次", None, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::AlreadyPromoted(_)));

    let promoted: Vec<_> = state
        .plan_repo
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|p| p.source_scenario_id.as_deref() == Some(ws.scenario_id.as_str()))
        .collect();
    assert_eq!(promoted.len(), 1);
}

#[test]
fn test_promote_requires_approval() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);

    let err = state
        .scenario_api
        .promote(&ws.scenario_id, "草稿采纳", None, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition { .. }));

    let err = state
        .scenario_api
        .promote(&ws.scenario_id, "  ", None, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

#[test]
fn test_adopted_scenario_is_terminal() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);
    approve(&state, &ws.scenario_id);
    state
        .scenario_api
        .promote(&ws.scenario_id, "终态", None, TEST_ACTOR)
        .unwrap();

    let err = state.scenario_api.archive(&ws.scenario_id, TEST_ACTOR).unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
    let err = state
        .scenario_api
        .delete_scenario(&ws.scenario_id, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::BusinessRuleViolation(_)));
}

#[test]
fn test_export_cut_only_with_groups() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);

    let table = state
        .scenario_api
        .export_lines(
            &ws.scenario_id,
            true,
            Some(vec![ExportColumnGroup::Deltas]),
            TEST_ACTOR,
        )
        .unwrap();

    assert_eq!(table.rows.len(), 1);
    let col = |name: &str| table.headers.iter().position(|h| h == name).unwrap();
    assert_eq!(table.rows[0][col("course_id")], "C");
    assert_eq!(table.rows[0][col("volume_delta")], "-20");
    assert_eq!(table.rows[0][col("cost_delta")], "-1000.00");
    assert!(!table.headers.iter().any(|h| h == "baseline_cost"));

    // 导出不改变工作区
    let after = state.scenario_api.get_scenario(&ws.scenario_id).unwrap();
    assert_eq!(after.revision, ws.revision);

    let trail = state.scenario_api.list_audit_trail(&ws.scenario_id).unwrap();
    let export_log = trail.last().unwrap();
    assert_eq!(export_log.kind(), Some(ActionType::Export));
    assert_eq!(export_log.payload_json.as_ref().unwrap()["rows"], 1);
}

#[test]
fn test_export_defaults_come_from_config() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);

    let all = state
        .scenario_api
        .export_lines(&ws.scenario_id, false, None, TEST_ACTOR)
        .unwrap();
    assert_eq!(all.rows.len(), 3);
    assert!(all.headers.iter().any(|h| h == "baseline_cost"));
    assert!(all.headers.iter().any(|h| h == "scenario_cost"));

    state
        .config_manager
        .set_global_config_value(config_keys::EXPORT_DEFAULT_GROUPS, "COSTS")
        .unwrap();
    let costs_only = state
        .scenario_api
        .export_lines(&ws.scenario_id, false, None, TEST_ACTOR)
        .unwrap();
    assert!(costs_only.headers.iter().any(|h| h == "scenario_cost"));
    assert!(!costs_only.headers.iter().any(|h| h == "baseline_cost"));
}

#[test]
fn test_export_csv_has_header_and_rows() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);

    let csv_text = state
        .scenario_api
        .export_csv(&ws.scenario_id, false, Some(vec![]), TEST_ACTOR)
        .unwrap();

    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[0], "line_no");
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 3);
    assert_eq!(&records[2][1], "C");
}

#[test]
fn test_summary_by_band() {
    let (_tmp, state) = create_test_state();
    let ws = recalculated_scenario(&state);

    let summary = state.scenario_api.summarize(&ws.scenario_id).unwrap();
    assert_close(summary.baseline_total_cost, 21000.0);
    assert_close(summary.scenario_total_cost, 20000.0);
    assert_close(summary.savings, 1000.0);
    assert_eq!(summary.total_cut_count(), 1);

    let low = summary.band(PriorityBand::Low).unwrap();
    assert_eq!(low.cut_count, 1);
    assert_eq!(low.scenario_participants, 0);
    let critical = summary.band(PriorityBand::Critical).unwrap();
    assert_close(critical.scenario_cost, 10000.0);
    assert_eq!(summary.band(PriorityBand::High).unwrap().line_count, 0);
}
