//! # TTS Batch
//!
//! 批量把文本文件转换为语音的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 外部客户端（Clients）
//! - `clients/` - 与远程合成 API 交互
//! - `ElevenLabsClient` - 实现 `Synthesizer` 能力
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单段文本或单个文件
//! - `TextChunker` - 文本规整与分段
//! - `Synthesizer` - 文本转语音接口
//! - `AudioWriter` - 写音频文件
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的完整处理流程
//! - `ConversionFlow` - 流程编排（读取 → 分段 → 合成 → 写入）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_runner` - 队列、worker、暂停/恢复/取消、统计
//! - `orchestrator/batch_processor` - 应用入口，扫描文件并驱动 Runner
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{BatchItem, BatchStats, ItemId, ItemStatus, RunOptions};
pub use orchestrator::{App, BatchEvent, BatchObserver, BatchRunner, ItemProcessor, ItemTicket, RunnerState};
pub use services::{chunk_text, SynthesisRequest, Synthesizer, TextChunker};
pub use workflow::{ConversionFlow, ConversionOutcome};
