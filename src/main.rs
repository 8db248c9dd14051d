// ==========================================
// 培训管理系统 - 预算情景命令行入口
// ==========================================
// 用法:
//   training-scenario list
//   training-scenario plans [plan_id]
//   training-scenario seed [plan_name]
//   training-scenario create <plan_id> <name> [owner]
//   training-scenario recalc <scenario_id> <levers.json> [actor]
//   training-scenario summary <scenario_id>
//   training-scenario export <scenario_id> [--cut-only]
//   training-scenario audit <scenario_id> [action_type] [actor]
//   training-scenario config <key> <value>
//
// 数据库路径: TRAINING_SCENARIO_DB_PATH 或用户数据目录
// 日志格式: TRAINING_SCENARIO_LOG_FORMAT=json 输出 JSON 行
// ==========================================

use std::process::ExitCode;

use training_scenario::app::{get_default_db_path, AppState};
use training_scenario::domain::{TrainingPlan, TrainingPlanLine};
use training_scenario::{ActionType, PriorityBand};

const USAGE: &str =
    "用法: training-scenario <list|plans|seed|create|recalc|summary|export|audit|config> [参数...]";
const CLI_ACTOR: &str = "cli";

fn main() -> ExitCode {
    match std::env::var("TRAINING_SCENARIO_LOG_FORMAT").as_deref() {
        Ok("json") => training_scenario::logging::init_json(),
        _ => training_scenario::logging::init(),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&state, command, &args[1..]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(state: &AppState, command: &str, rest: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let api = &state.scenario_api;

    match command {
        "list" => {
            let page = api.list_scenarios(None, None, 100, 0)?;
            println!("共 {} 个情景", page.total);
            for ws in page.items {
                let marker = if ws.is_snapshot_failed() { "\t[快照失败]" } else { "" };
                println!(
                    "{}\t{}\t{}\t{:.2}/{:.2}\trev={}{}",
                    ws.scenario_id,
                    ws.status,
                    ws.name,
                    ws.scenario_total_cost,
                    ws.baseline_total_cost,
                    ws.revision,
                    marker
                );
            }
        }
        "plans" => {
            if let Some(plan_id) = rest.first() {
                for line in state.plan_repo.find_lines_by_plan(plan_id)? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{:.2}",
                        line.line_no,
                        line.course_id,
                        line.course_name,
                        line.priority_band,
                        line.volume,
                        line.cost
                    );
                }
                return Ok(());
            }
            for plan in state.plan_repo.list_all()? {
                println!(
                    "{}\tv{}\t{}\t{:.2}\t{}",
                    plan.plan_id, plan.version, plan.plan_name, plan.total_budget, plan.total_participants
                );
            }
        }
        "seed" => {
            let name = rest.first().map(String::as_str).unwrap_or("演示培训计划");
            let plan_id = seed_demo_plan(state, name)?;
            println!("plan_id={}", plan_id);
        }
        "create" => {
            let (Some(plan_id), Some(name)) = (rest.first(), rest.get(1)) else {
                return Err("用法: create <plan_id> <name> [owner]".into());
            };
            let owner = rest.get(2).map(String::as_str).unwrap_or(CLI_ACTOR);
            let plan = state
                .plan_repo
                .find_by_id(plan_id)?
                .ok_or_else(|| format!("培训计划不存在: {}", plan_id))?;
            let ws = api.create_scenario(plan_id, plan.version, name, None, None, owner)?;
            println!(
                "scenario_id={} status={} progress={}",
                ws.scenario_id, ws.status, ws.creation_progress
            );
        }
        "recalc" => {
            let (Some(scenario_id), Some(levers_path)) = (rest.first(), rest.get(1)) else {
                return Err("用法: recalc <scenario_id> <levers.json> [actor]".into());
            };
            let actor = rest.get(2).map(String::as_str).unwrap_or(CLI_ACTOR);
            let levers_json = std::fs::read_to_string(levers_path)?;
            let result = api.recalculate_with_json(scenario_id, &levers_json, actor)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        "summary" => {
            let Some(scenario_id) = rest.first() else {
                return Err("用法: summary <scenario_id>".into());
            };
            let summary = api.summarize(scenario_id)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "export" => {
            let Some(scenario_id) = rest.first() else {
                return Err("用法: export <scenario_id> [--cut-only]".into());
            };
            let cut_only = rest.iter().any(|a| a == "--cut-only");
            let csv_text = api.export_csv(scenario_id, cut_only, None, CLI_ACTOR)?;
            print!("{}", csv_text);
        }
        "audit" => {
            let Some(scenario_id) = rest.first() else {
                return Err("用法: audit <scenario_id> [action_type] [actor]".into());
            };
            let action_type = match rest.get(1).map(String::as_str) {
                None | Some("all") => None,
                Some(raw) => Some(
                    ActionType::parse(raw).ok_or_else(|| format!("未知操作类型: {}", raw))?,
                ),
            };
            let actor = rest.get(2).cloned();
            let page = api.list_audit_trail_page(scenario_id, action_type, actor, 200, 0)?;
            println!("共 {} 条审计记录", page.total);
            for log in page.items {
                println!(
                    "{}\t{}\t{}\t{}",
                    log.action_ts,
                    log.action_type,
                    log.actor,
                    log.payload_json.map(|p| p.to_string()).unwrap_or_default()
                );
            }
        }
        "config" => {
            let (Some(key), Some(value)) = (rest.first(), rest.get(1)) else {
                return Err("用法: config <key> <value>".into());
            };
            state.config_manager.set_global_config_value(key, value)?;
            println!("{}={}", key, value);
        }
        other => {
            return Err(format!("未知命令: {}\n{}", other, USAGE).into());
        }
    }

    Ok(())
}

/// 写入一份演示用基准计划（四个分档各若干课程）
fn seed_demo_plan(state: &AppState, name: &str) -> Result<String, Box<dyn std::error::Error>> {
    let now = chrono::Local::now().naive_local();
    let plan_id = uuid::Uuid::new_v4().to_string();

    let specs: [(&str, &str, PriorityBand, i64, i64, f64, bool); 6] = [
        ("SAFE-01", "安全生产基础", PriorityBand::Critical, 120, 4, 36000.0, false),
        ("LEAD-02", "中层管理提升", PriorityBand::High, 40, 2, 48000.0, false),
        ("LANG-03", "商务英语", PriorityBand::Medium, 60, 3, 18000.0, false),
        ("ABRD-04", "海外工厂交流", PriorityBand::Medium, 10, 1, 60000.0, true),
        ("SOFT-05", "沟通技巧", PriorityBand::Low, 80, 4, 16000.0, false),
        ("HOBB-06", "兴趣拓展", PriorityBand::Low, 50, 2, 7500.0, false),
    ];

    let lines: Vec<TrainingPlanLine> = specs
        .iter()
        .enumerate()
        .map(|(idx, (course_id, course_name, band, volume, sessions, cost, abroad))| TrainingPlanLine {
            line_id: uuid::Uuid::new_v4().to_string(),
            plan_id: plan_id.clone(),
            line_no: idx as i32 + 1,
            course_id: course_id.to_string(),
            course_name: course_name.to_string(),
            entity_id: Some(if idx % 2 == 0 { "HQ" } else { "PLANT-A" }.to_string()),
            category_id: Some(if idx == 0 { "COMPLIANCE" } else { "GENERAL" }.to_string()),
            volume: *volume,
            sessions: *sessions,
            cost: *cost,
            priority_band: *band,
            is_protected: false,
            is_abroad: *abroad,
        })
        .collect();

    let plan = TrainingPlan {
        plan_id: plan_id.clone(),
        plan_name: name.to_string(),
        description: Some("命令行生成的演示数据".to_string()),
        version: 1,
        total_budget: lines.iter().map(|l| l.cost).sum(),
        total_participants: lines.iter().map(|l| l.volume).sum(),
        source_scenario_id: None,
        created_by: CLI_ACTOR.to_string(),
        created_at: now,
        updated_at: now,
    };

    state.plan_repo.create_with_lines(&plan, &lines)?;
    Ok(plan_id)
}
