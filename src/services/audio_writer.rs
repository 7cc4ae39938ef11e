//! 音频写入服务 - 业务能力层
//!
//! 只负责"把字节写到磁盘"能力，不关心流程

use crate::error::FileError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 多段输出时第 `index` 段（从 1 开始）的文件路径：`<stem>_part<index>.<ext>`
pub fn part_output_path(output: &Path, index: usize) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = match output.extension() {
        Some(ext) => format!("{}_part{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_part{}", stem, index),
    };
    output.with_file_name(file_name)
}

/// 音频写入服务
#[derive(Debug, Clone, Default)]
pub struct AudioWriter;

impl AudioWriter {
    pub fn new() -> Self {
        Self
    }

    /// 写入音频，必要时创建父目录
    pub async fn write(&self, path: &Path, audio: &[u8]) -> Result<(), FileError> {
        ensure_parent(path).await?;
        fs::write(path, audio)
            .await
            .map_err(|source| FileError::WriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("写入音频: {} ({} 字节)", path.display(), audio.len());
        Ok(())
    }

    /// 将已有的分段文件提升为最终输出
    pub async fn promote(&self, from: &Path, to: &Path) -> Result<(), FileError> {
        ensure_parent(to).await?;
        fs::copy(from, to)
            .await
            .map_err(|source| FileError::CopyFailed {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> Result<(), FileError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| FileError::WriteFailed {
                    path: parent.to_path_buf(),
                    source,
                })
        }
        _ => Ok(()),
    }
}
