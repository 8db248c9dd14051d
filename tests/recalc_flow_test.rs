// ==========================================
// 情景重算集成测试
// ==========================================
// 测试范围:
// 1. 示例计划在持久化顺序 / 声明意图顺序下的分配结果
// 2. 分档排除清零、受保护明细保底
// 3. 锁定明细在重算中保持不变
// 4. 杠杆持久化与沿用、聚合一致性、审计记录
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use std::collections::BTreeMap;

use test_helpers::{
    assert_close, create_scenario, create_test_state, example_seeds, seed_plan, LineSeed,
    TEST_ACTOR,
};
use training_scenario::api::ApiError;
use training_scenario::config::config_keys;
use training_scenario::domain::{ActionType, EntityCap};
use training_scenario::{BudgetType, CutTraversal, LeverConfig, PriorityBand};

fn absolute_budget(value: f64) -> LeverConfig {
    LeverConfig {
        global_budget_type: Some(BudgetType::Absolute),
        global_budget_value: Some(value),
        ..Default::default()
    }
}

/// 校验聚合值等于明细求和
fn assert_aggregates_consistent(state: &training_scenario::app::AppState, scenario_id: &str) {
    let ws = state.scenario_api.get_scenario(scenario_id).unwrap();
    let page = state
        .scenario_api
        .list_line_items(scenario_id, false, None, 1000, 0)
        .unwrap();
    let cost: f64 = page.items.iter().map(|l| l.scenario_cost).sum();
    let volume: i64 = page.items.iter().map(|l| l.scenario_volume).sum();
    assert_close(ws.scenario_total_cost, cost);
    assert_eq!(ws.scenario_total_participants, volume);
}

#[test]
fn test_example_plan_in_persisted_order() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "压缩15000");
    assert_close(ws.baseline_total_cost, 21000.0);
    assert_close(ws.scenario_total_cost, 21000.0);

    let result = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(absolute_budget(15000.0)), TEST_ACTOR)
        .unwrap();

    // A 在前消耗 10000，B 受保护 10000，C 无剩余额度
    assert_eq!(result.traversal, CutTraversal::Persisted);
    assert_close(result.total_cost, 20000.0);
    assert_eq!(result.total_participants, 150);
    assert_eq!(result.items_updated, 3);
    assert_eq!(result.protected_count, 1);
    assert_eq!(result.clamped_count, 1);
    assert_eq!(result.target_budget, Some(15000.0));

    let lines = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items;
    let volumes: Vec<i64> = lines.iter().map(|l| l.scenario_volume).collect();
    assert_eq!(volumes, vec![100, 50, 0]);
    assert!(!lines[0].is_cut);
    assert!(!lines[1].is_cut);
    assert!(lines[2].is_cut);
    assert_eq!(lines[2].scenario_sessions, 0);

    assert_aggregates_consistent(&state, &ws.scenario_id);

    let refreshed = state.scenario_api.get_scenario(&ws.scenario_id).unwrap();
    assert!(refreshed.last_recalculation_at.is_some());
    assert_eq!(refreshed.revision, result.revision);
}

#[test]
fn test_example_plan_in_declared_intent_order() {
    let (_tmp, state) = create_test_state();
    state
        .config_manager
        .set_global_config_value(config_keys::CUT_TRAVERSAL, "DECLARED_INTENT")
        .unwrap();

    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "按削减顺序");

    let levers = LeverConfig {
        cut_order: vec![PriorityBand::Low, PriorityBand::Medium, PriorityBand::Critical],
        ..absolute_budget(15000.0)
    };
    let result = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
        .unwrap();

    // 遍历顺序 B -> A -> C: A 截断为 50 人，C 清零
    assert_eq!(result.traversal, CutTraversal::DeclaredIntent);
    assert_close(result.total_cost, 15000.0);
    assert_eq!(result.total_participants, 100);

    let lines = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items;
    // 明细仍按 line_no 返回
    assert_eq!(lines[0].course_id, "A");
    assert_eq!(lines[0].scenario_volume, 50);
    assert_close(lines[0].scenario_cost, 5000.0);
    assert_eq!(lines[1].scenario_volume, 50);
    assert_eq!(lines[2].scenario_volume, 0);
}

#[test]
fn test_excluded_band_is_zeroed_without_budget() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "去掉低优先级");

    let levers = LeverConfig {
        include_priority_bands: vec![PriorityBand::Critical, PriorityBand::Medium],
        ..Default::default()
    };
    let result = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
        .unwrap();

    assert_eq!(result.excluded_count, 1);
    assert_eq!(result.target_budget, None);
    assert_close(result.total_cost, 20000.0);

    let cut = state
        .scenario_api
        .list_line_items(&ws.scenario_id, true, None, 100, 0)
        .unwrap();
    assert_eq!(cut.total, 1);
    assert_eq!(cut.items[0].course_id, "C");
    assert_eq!(cut.items[0].scenario_volume, 0);
    assert_close(cut.items[0].scenario_cost, 0.0);
}

#[test]
fn test_protected_category_keeps_baseline_under_pressure() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(
        &state,
        "合规计划",
        &[
            LineSeed::new("X", PriorityBand::Low, 40, 100.0).category("COMPLIANCE"),
            LineSeed::new("Y", PriorityBand::High, 40, 100.0),
        ],
    );
    let ws = create_scenario(&state, &plan, "合规优先");

    let levers = LeverConfig {
        protected_categories: vec!["COMPLIANCE".to_string()],
        ..absolute_budget(1000.0)
    };
    state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
        .unwrap();

    let lines = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items;
    assert_eq!(lines[0].scenario_volume, 40);
    assert_eq!(lines[1].scenario_volume, 0);
    assert_aggregates_consistent(&state, &ws.scenario_id);
}

#[test]
fn test_entity_cap_limits_its_lines_only() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(
        &state,
        "分厂计划",
        &[
            LineSeed::new("P1", PriorityBand::Medium, 10, 100.0).entity("PLANT-A"),
            LineSeed::new("P2", PriorityBand::Medium, 10, 100.0).entity("PLANT-A"),
            LineSeed::new("H1", PriorityBand::Medium, 10, 100.0).entity("HQ"),
        ],
    );
    let ws = create_scenario(&state, &plan, "分厂限额");

    let mut entity_caps = BTreeMap::new();
    entity_caps.insert(
        "PLANT-A".to_string(),
        EntityCap {
            cap_type: BudgetType::Percentage,
            value: 75.0,
        },
    );
    let levers = LeverConfig {
        entity_caps,
        ..Default::default()
    };
    let result = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
        .unwrap();

    // PLANT-A 基准 2000，上限 1500: P1 全额，P2 截断为 5 人
    assert_eq!(result.clamped_count, 1);
    let volumes: Vec<i64> = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items
        .iter()
        .map(|l| l.scenario_volume)
        .collect();
    assert_eq!(volumes, vec![10, 5, 10]);
}

#[test]
fn test_locked_line_survives_repeated_recalculation() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "锁定A");

    let a_line = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items
        .into_iter()
        .find(|l| l.course_id == "A")
        .unwrap();

    state
        .scenario_api
        .adjust_line(&ws.scenario_id, &a_line.line_id, 30, None, TEST_ACTOR)
        .unwrap();

    for levers in [
        absolute_budget(0.0),
        LeverConfig {
            include_priority_bands: vec![PriorityBand::Critical],
            ..Default::default()
        },
        absolute_budget(1_000_000.0),
    ] {
        let result = state
            .scenario_api
            .recalculate(&ws.scenario_id, Some(levers), TEST_ACTOR)
            .unwrap();
        assert_eq!(result.locked_count, 1);
        assert_eq!(result.items_updated, 2);

        let line = state
            .scenario_api
            .list_line_items(&ws.scenario_id, false, None, 100, 0)
            .unwrap()
            .items
            .into_iter()
            .find(|l| l.line_id == a_line.line_id)
            .unwrap();
        assert_eq!(line.scenario_volume, 30);
        assert_close(line.scenario_cost, 3000.0);
        assert!(line.is_locally_adjusted());
        assert_aggregates_consistent(&state, &ws.scenario_id);
    }
}

#[test]
fn test_locked_cost_consumes_budget_headroom() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(
        &state,
        "台账计划",
        &[
            LineSeed::new("L1", PriorityBand::Medium, 10, 100.0),
            LineSeed::new("L2", PriorityBand::Medium, 10, 100.0),
        ],
    );
    let ws = create_scenario(&state, &plan, "台账");

    let second = state
        .scenario_api
        .list_line_items(&ws.scenario_id, false, None, 100, 0)
        .unwrap()
        .items[1]
        .clone();
    state
        .scenario_api
        .adjust_line(&ws.scenario_id, &second.line_id, 8, None, TEST_ACTOR)
        .unwrap();

    // 预算 1500: L1 先遍历全额 1000，L2 锁定 800 不受影响
    let result = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(absolute_budget(1500.0)), TEST_ACTOR)
        .unwrap();
    assert_close(result.total_cost, 1800.0);
    assert_eq!(result.clamped_count, 0);
}

#[test]
fn test_levers_persist_and_are_reused() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "沿用杠杆");

    let levers = LeverConfig {
        global_budget_type: Some(BudgetType::Percentage),
        global_budget_value: Some(50.0),
        ..Default::default()
    };
    let first = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(levers.clone()), TEST_ACTOR)
        .unwrap();
    assert_eq!(first.target_budget, Some(10500.0));

    let stored = state.scenario_api.get_scenario(&ws.scenario_id).unwrap();
    assert_eq!(stored.levers.as_ref(), Some(&levers));

    let second = state
        .scenario_api
        .recalculate(&ws.scenario_id, None, TEST_ACTOR)
        .unwrap();
    assert_close(second.total_cost, first.total_cost);
    assert_eq!(second.total_participants, first.total_participants);
    assert!(second.revision > first.revision);
}

#[test]
fn test_recalculate_writes_audit_entry_with_levers() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "审计");

    state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(absolute_budget(15000.0)), TEST_ACTOR)
        .unwrap();

    let trail = state.scenario_api.list_audit_trail(&ws.scenario_id).unwrap();
    let kinds: Vec<Option<ActionType>> = trail.iter().map(|l| l.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(ActionType::Created),
            Some(ActionType::SnapshotCompleted),
            Some(ActionType::Recalculate),
        ]
    );

    let payload = trail[2].payload_json.as_ref().unwrap();
    assert_eq!(payload["levers"]["globalBudgetType"], "absolute");
    assert_eq!(payload["levers"]["globalBudgetValue"], 15000.0);
    assert_eq!(trail[2].actor, TEST_ACTOR);
}

#[test]
fn test_recalculate_rejects_invalid_input_before_writing() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "非法杠杆");

    let bad = LeverConfig {
        global_budget_type: None,
        global_budget_value: Some(100.0),
        ..Default::default()
    };
    let err = state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(bad), TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let err = state
        .scenario_api
        .recalculate_with_json(&ws.scenario_id, "{not json", TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let err = state
        .scenario_api
        .recalculate("missing", None, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let unchanged = state.scenario_api.get_scenario(&ws.scenario_id).unwrap();
    assert_eq!(unchanged.revision, ws.revision);
    assert!(unchanged.levers.is_none());
}

#[test]
fn test_recalculate_requires_editable_status() {
    let (_tmp, state) = create_test_state();
    let plan = seed_plan(&state, "年度计划", &example_seeds());
    let ws = create_scenario(&state, &plan, "已批准");

    state.scenario_api.submit_for_review(&ws.scenario_id, TEST_ACTOR).unwrap();
    // 审核中仍可重算
    state
        .scenario_api
        .recalculate(&ws.scenario_id, Some(absolute_budget(15000.0)), TEST_ACTOR)
        .unwrap();

    state.scenario_api.approve(&ws.scenario_id, TEST_ACTOR).unwrap();
    let err = state
        .scenario_api
        .recalculate(&ws.scenario_id, None, TEST_ACTOR)
        .unwrap_err();
    assert!(matches!(err, ApiError::BusinessRuleViolation(_)));
}
