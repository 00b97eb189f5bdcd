/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, FileError};
use crate::models::outcome::{JobOutcome, JobStatus};

/// 初始化 tracing 订阅者
///
/// RUST_LOG 优先；否则 verbose 时为 debug，默认 info。
/// 重复调用是安全的（测试里会多次调用）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<(), AppError> {
    let log_header = format!(
        "{}\n对话任务日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| FileError::write_failed(log_file_path, e))?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发数
/// - `target_url`: 聊天应用地址
pub fn log_startup(max_concurrent: usize, target_url: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多标签页并发模式");
    info!("📊 最大并发数: {}", max_concurrent);
    info!("🌐 目标地址: {}", target_url);
    info!("{}", "=".repeat(60));
}

/// 记录任务加载信息
pub fn log_jobs_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 共 {} 个待处理的任务", total);
    info!("📋 最多同时打开 {} 个标签页", max_concurrent);
    info!("💡 任务按提交顺序开始，结果按提交顺序返回\n");
}

/// 记录单个任务开始
pub fn log_job_start(index: usize, total: usize, job_id: &str, mode: &str) {
    info!("\n{}", "─".repeat(60));
    info!("[任务 {}] ▶ 开始 ({}/{}) id={} 模式={}", index, index, total, job_id, mode);
}

/// 记录单个任务结束
pub fn log_job_complete(index: usize, outcome: &JobOutcome) {
    let icon = if outcome.is_success() { "✅" } else { "❌" };
    info!(
        "[任务 {}] {} 结束: {:?}，耗时 {:.1}s",
        index,
        icon,
        outcome.status,
        outcome.duration.as_secs_f64()
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `outcomes`: 按提交顺序排列的结果
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(outcomes: &[JobOutcome], log_file_path: &str) {
    let total = outcomes.len();
    let success = outcomes.iter().filter(|o| o.is_success()).count();
    let count = |status: JobStatus| outcomes.iter().filter(|o| o.status == status).count();

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!("完成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!(
        "❌ 失败: {} (超时 {} / 界面变化 {} / 未登录 {} / 取消 {} / 其他 {})",
        total - success,
        count(JobStatus::Timeout),
        count(JobStatus::UiChanged),
        count(JobStatus::AuthFailure),
        count(JobStatus::Cancelled),
        count(JobStatus::Error)
    );
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
