// ==========================================
// 培训管理系统 - 日志初始化
// ==========================================
// 工具: tracing + tracing-subscriber (EnvFilter)
// 级别: RUST_LOG 覆盖，默认 info
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 默认过滤器（未设置 RUST_LOG 时使用）
pub const DEFAULT_FILTER: &str = "info";

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器，例如 `RUST_LOG=training_scenario::engine=debug`
///
/// # 示例
/// ```no_run
/// use training_scenario::logging;
/// logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // 重复初始化（例如嵌入到其他程序）时保持已有订阅者
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init();
}

/// 以 JSON 行格式输出（供日志采集使用）
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = fmt().json().with_env_filter(filter).try_init();
}

/// 初始化测试环境的日志系统
///
/// 输出经由测试捕获，多次调用安全。
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
