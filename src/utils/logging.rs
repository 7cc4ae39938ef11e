use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::BatchStats;

/// 初始化 tracing
///
/// 优先使用 `RUST_LOG`，否则根据 `verbose` 选择 debug / info。重复调用无副作用。
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n语音转换日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `voice_id`: 声音 ID
/// - `model_id`: 模型 ID
/// - `chunk_size`: 每段最大字符数
pub fn log_startup(voice_id: &str, model_id: &str, chunk_size: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量文本转语音");
    info!("🎙️ 声音: {} | 模型: {}", voice_id, model_id);
    info!("✂️ 每段最大字符数: {}", chunk_size);
    info!("{}", "=".repeat(60));
}

/// 记录文件加载信息
pub fn log_files_loaded(total: usize, output_folder: &str) {
    info!("✓ 找到 {} 个待转换的文本文件", total);
    info!("📂 输出目录: {}\n", output_folder);
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &BatchStats, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.completed, stats.total);
    info!("❌ 失败: {}", stats.failed);
    info!("⏹️ 取消: {}", stats.cancelled);
    if stats.warnings > 0 {
        info!("⚠️ 有警告: {}", stats.warnings);
    }
    if stats.is_partial_failure() {
        info!("⚠️ 部分条目失败，可重新入队后再次运行");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
