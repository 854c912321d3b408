//! 日志工具模块
//!
//! 提供 tracing 初始化以及日志格式化和输出的辅助函数

use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// 初始化 tracing
///
/// 设置了 `RUST_LOG` 时以其为准，否则为 info（详细模式为 debug）
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n题目生成日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::file_write_failed(log_file_path, e))
}

/// 记录程序启动信息
pub fn log_startup(max_batch_size: usize, max_concurrent: usize, model: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量题目生成模式");
    info!("🤖 模型: {}", model);
    info!("📦 批次上限: {} 题", max_batch_size);
    info!("📊 最大并发批次数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录打包结果
///
/// # 参数
/// - `questions`: 题目总数
/// - `batches`: 批次总数
pub fn log_batches_packed(questions: usize, batches: usize) {
    info!("✓ 共 {} 道题，打包为 {} 个批次", questions, batches);
}

/// 记录批次开始信息
///
/// # 参数
/// - `position`: 批次位置（从1开始）
/// - `total`: 批次总数
/// - `batch_key`: 批次键
/// - `size`: 批次题目数
pub fn log_batch_start(position: usize, total: usize, batch_key: &str, size: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批: {} ({} 题)", position, total, batch_key, size);
    info!("{}", "=".repeat(60));
}

/// 记录批次完成信息
pub fn log_batch_complete(batch_key: &str, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ {} 完成: 成功 {}/{}", batch_key, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    batches_ok: usize,
    batches_total: usize,
    questions_ok: usize,
    questions_failed: usize,
    output_file: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📦 批次: 成功 {}/{}", batches_ok, batches_total);
    info!("✅ 题目成功: {}", questions_ok);
    info!("❌ 题目失败: {}", questions_failed);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_file);
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
