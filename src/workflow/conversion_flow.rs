//! 单个条目的转换流程 - 流程层
//!
//! 核心职责：定义"一个文件"的完整处理流程
//!
//! 流程顺序：
//! 1. 读取并切分文本
//! 2. 逐段调用合成接口（严格按原文顺序）
//! 3. 写入单个输出文件，或写入分段文件后提升第 1 段
//!
//! 不做重试，不删除源文件。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult, InputError};
use crate::models::RunOptions;
use crate::orchestrator::batch_runner::{ItemProcessor, ItemTicket};
use crate::services::{part_output_path, AudioWriter, SynthesisRequest, Synthesizer, TextChunker};
use crate::utils::logging::truncate_text;

/// 条目转换结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// 单段文本，直接写入输出路径
    Single { output: PathBuf },
    /// 多段文本，每段一个文件；目前只把第 1 段提升为输出文件
    Parts {
        parts: Vec<PathBuf>,
        promoted: PathBuf,
    },
}

/// 条目转换流程
///
/// - 持有分段器、合成能力和写入能力
/// - 每次只处理一个条目
/// - 不关心队列、暂停、取消
pub struct ConversionFlow {
    chunker: TextChunker,
    synthesizer: Arc<dyn Synthesizer>,
    writer: AudioWriter,
}

impl ConversionFlow {
    pub fn new(chunker: TextChunker, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            chunker,
            synthesizer,
            writer: AudioWriter::new(),
        }
    }

    pub async fn run(&self, ticket: &ItemTicket, options: &RunOptions) -> AppResult<ConversionOutcome> {
        let id = ticket.id();
        let input = ticket.input_file();
        let output = ticket.output_file();

        ticket.set_message("reading input");
        let chunks = self.chunker.chunk_file(input).await?;

        if chunks.is_empty() {
            warn!("[条目 {}] ⚠️ 输入为空: {}", id, input.display());
            return Err(InputError::Empty {
                path: input.to_path_buf(),
            }
            .into());
        }

        if let [text] = chunks.as_slice() {
            info!(
                "[条目 {}] 🔊 单段合成 ({} 字符): {}",
                id,
                text.chars().count(),
                truncate_text(text, 40)
            );
            ticket.set_message("converting");
            let audio = self
                .synthesizer
                .synthesize(&SynthesisRequest::new(text, options))
                .await?;
            self.writer.write(output, &audio).await?;
            info!("[条目 {}] ✓ 已写入 {}", id, output.display());
            return Ok(ConversionOutcome::Single {
                output: output.to_path_buf(),
            });
        }

        let total = chunks.len();
        info!("[条目 {}] 📄 文本被切分为 {} 段", id, total);
        ticket.report_progress(0, format!("converting {} parts", total));

        let mut parts = Vec::with_capacity(total);
        for (i, text) in chunks.iter().enumerate() {
            let index = i + 1;
            ticket.set_message(format!("converting part {}/{}", index, total));

            let audio = match self
                .synthesizer
                .synthesize(&SynthesisRequest::new(text, options))
                .await
            {
                Ok(audio) => audio,
                Err(source) => {
                    error!("[条目 {}] ❌ 第 {}/{} 段合成失败: {}", id, index, total, source);
                    return Err(AppError::ChunkFailed {
                        index,
                        total,
                        source,
                    });
                }
            };

            let part = part_output_path(output, index);
            self.writer.write(&part, &audio).await?;
            parts.push(part);

            let progress = (index * 100 / total) as u8;
            ticket.report_progress(progress, format!("part {}/{} done", index, total));
        }

        // TODO: 合并分段音频后替换这里的提升逻辑
        let first = &parts[0];
        self.writer.promote(first, output).await?;
        let notice = format!(
            "{} parts were not combined; only part 1 was copied to {}",
            total,
            output.display()
        );
        warn!("[条目 {}] ⚠️ {}", id, notice);
        ticket.set_warning(notice);

        Ok(ConversionOutcome::Parts {
            promoted: output.to_path_buf(),
            parts,
        })
    }
}

#[async_trait]
impl ItemProcessor for ConversionFlow {
    async fn process(&self, ticket: ItemTicket, options: Arc<RunOptions>) -> Result<bool> {
        let outcome = self.run(&ticket, &options).await?;
        let message = match &outcome {
            ConversionOutcome::Single { .. } => "completed".to_string(),
            ConversionOutcome::Parts { parts, .. } => {
                format!("completed ({} parts, first promoted)", parts.len())
            }
        };
        ticket.set_message(message);
        Ok(true)
    }
}
