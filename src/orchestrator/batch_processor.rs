//! 批量转换处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量文件的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、写日志头、创建合成客户端并校验 API Key
//! 2. **批量加载**：扫描输入目录中的所有文本文件
//! 3. **调度**：把文件入队到 `BatchRunner`，安装 `ConversionFlow` 作为处理函数
//! 4. **中断**：收到 Ctrl-C 时取消批处理，仍等待完成通知
//! 5. **全局统计**：输出统计并写出 JSON 报告
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个文件的细节
//! - **资源所有者**：唯一持有合成客户端的模块
//! - **向下委托**：委托 `ConversionFlow` 处理单个条目

use crate::clients::elevenlabs_client::KeyStatus;
use crate::clients::ElevenLabsClient;
use crate::config::Config;
use crate::error::ConfigError;
use crate::models::{collect_input_pairs, BatchItem, BatchStats, ItemStatus};
use crate::orchestrator::batch_runner::{BatchObserver, BatchRunner};
use crate::services::{Synthesizer, TextChunker};
use crate::utils::logging::{init_log_file, log_files_loaded, log_startup, print_final_stats};
use crate::workflow::ConversionFlow;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    synthesizer: Arc<dyn Synthesizer>,
    runner: BatchRunner,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate().context("配置校验失败")?;

        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        log_startup(&config.voice_id, &config.model_id, config.chunk_size);

        let client = ElevenLabsClient::new(&config)?;
        match client.validate_api_key().await {
            Ok(KeyStatus::Valid) => info!("✓ API Key 校验通过"),
            Ok(KeyStatus::Invalid) => anyhow::bail!("API Key 无效或已过期"),
            Ok(KeyStatus::Unknown(code)) => warn!("⚠️ API Key 校验返回 {}，继续执行", code),
            Err(e) => warn!("⚠️ API Key 校验失败: {:#}，继续执行", e),
        }

        Ok(Self::with_synthesizer(config, Arc::new(client)))
    }

    /// 使用自定义的合成能力创建应用（不做网络校验）
    pub fn with_synthesizer(config: Config, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let runner = BatchRunner::with_item_delay(config.item_delay());
        Self {
            config,
            synthesizer,
            runner,
        }
    }

    pub fn runner(&self) -> &BatchRunner {
        &self.runner
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<BatchStats> {
        info!("\n📁 正在扫描待转换的文本...");
        let pairs = collect_input_pairs(
            &self.config.input_folder,
            &self.config.output_folder,
            &self.config.output_format,
        )
        .await?;

        if pairs.is_empty() {
            warn!("⚠️ 没有找到待转换的文本文件，程序结束");
            return Ok(self.runner.stats());
        }

        log_files_loaded(pairs.len(), &self.config.output_folder);
        self.runner.enqueue_many(pairs);

        let stats = self.process_all().await?;

        print_final_stats(&stats, &self.config.output_log_file);
        self.write_report(&stats)?;

        Ok(stats)
    }

    /// 处理队列中的所有条目
    async fn process_all(&self) -> Result<BatchStats> {
        let flow = ConversionFlow::new(
            TextChunker::new(self.config.chunk_size),
            self.synthesizer.clone(),
        );
        self.runner.set_processor(flow);
        let log_handle = self.runner.add_observer(Arc::new(LogObserver));

        if !self.runner.start(self.config.run_options()) {
            self.runner.remove_observer(log_handle);
            anyhow::bail!("批处理启动失败");
        }

        tokio::select! {
            _ = self.runner.wait_finished() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => warn!("⚠️ 收到中断信号，正在取消（当前文件完成后停止）..."),
                    Err(e) => error!("监听中断信号失败: {}", e),
                }
                self.runner.cancel();
                self.runner.wait_finished().await;
            }
        }

        self.runner.remove_observer(log_handle);
        Ok(self.runner.stats())
    }

    /// 写出 JSON 报告
    fn write_report(&self, stats: &BatchStats) -> Result<()> {
        let report = BatchReport {
            finished_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            stats: *stats,
            items: self.runner.items(),
        };
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&self.config.report_file, json)
            .with_context(|| format!("无法写入报告: {}", self.config.report_file))?;
        info!("📝 报告已保存至: {}", self.config.report_file);
        Ok(())
    }
}

/// 账户信息查询项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountQuery {
    pub voices: bool,
    pub models: bool,
    pub credits: bool,
}

impl AccountQuery {
    pub fn is_empty(&self) -> bool {
        !(self.voices || self.models || self.credits)
    }
}

/// 查询并打印账户信息（只需要 API Key）
pub async fn show_account_info(config: &Config, query: AccountQuery) -> Result<()> {
    if config.api_key.trim().is_empty() {
        return Err(ConfigError::Missing { name: "api_key" }).context("配置校验失败");
    }
    let client = ElevenLabsClient::new(config)?;

    if query.voices {
        let voices = client.list_voices().await?;
        info!("🎙️ 可用声音 ({}):", voices.len());
        for voice in &voices {
            info!(
                "  {}  {}  [{}]",
                voice.voice_id,
                voice.name,
                voice.category.as_deref().unwrap_or("-")
            );
        }
    }

    if query.models {
        let models = client.list_models().await?;
        info!("🧠 可用模型 ({}):", models.len());
        for model in models.iter().filter(|m| m.can_do_text_to_speech) {
            info!("  {}  {}", model.model_id, model.name);
        }
    }

    if query.credits {
        let sub = client.subscription().await?;
        info!(
            "💳 套餐: {} | 已用 {} / {} 字符，剩余 {}",
            sub.tier,
            sub.character_count,
            sub.character_limit,
            sub.remaining_characters()
        );
    }

    Ok(())
}

/// 批处理报告
#[derive(Debug, Serialize)]
struct BatchReport {
    finished_at: String,
    stats: BatchStats,
    items: Vec<BatchItem>,
}

/// 把状态变化写入日志
struct LogObserver;

impl BatchObserver for LogObserver {
    fn on_item_status_changed(&self, item: &BatchItem) {
        let name = item.display_name();
        match item.status {
            ItemStatus::Pending => {}
            ItemStatus::Processing => {
                info!("\n[条目 {}] {}", item.id, "─".repeat(30));
                info!("[条目 {}] 开始转换: {}", item.id, name);
            }
            ItemStatus::Completed => match &item.warning {
                Some(warning) => warn!("[条目 {}] ✓ 完成（有警告）: {} - {}", item.id, name, warning),
                None => info!("[条目 {}] ✅ 转换完成: {}", item.id, item.output_file.display()),
            },
            ItemStatus::Failed => error!("[条目 {}] ❌ 转换失败: {} - {}", item.id, name, item.message),
            ItemStatus::Cancelled => warn!("[条目 {}] ⏹️ 已取消: {}", item.id, name),
        }
    }

    fn on_item_progress(&self, item: &BatchItem) {
        info!("[条目 {}] {}% {}", item.id, item.progress, item.message);
    }

    fn on_batch_completed(&self, stats: &BatchStats) {
        info!(
            "\n{}\n✓ 批处理结束: 成功 {}/{}\n{}",
            "─".repeat(60),
            stats.completed,
            stats.total,
            "─".repeat(60)
        );
    }
}
