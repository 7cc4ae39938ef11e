//! 错误类型
//!
//! 条目级错误（输入、合成）只会被记录到条目的状态与消息中，
//! 永远不会逃出 worker 循环。
//!
//! Display 只描述本层，底层原因通过 `source()` 链给出，
//! 条目消息用 `{:#}` 把整条链拼接起来。

use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入文件错误
    #[error(transparent)]
    Input(#[from] InputError),
    /// 远程合成错误
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    /// 多段合成中某一段失败
    #[error("chunk {index}/{total} failed")]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: SynthesisError,
    },
    /// 文件写入错误
    #[error(transparent)]
    File(#[from] FileError),
    /// 配置错误
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
}

/// 输入错误
#[derive(Debug, Error)]
pub enum InputError {
    /// 文件不存在或无法读取
    #[error("empty or unreadable input: {}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 文件内容为空（预处理后没有任何文本段）
    #[error("empty or unreadable input: {}", path.display())]
    Empty { path: PathBuf },
}

/// 远程合成失败
///
/// 不区分状态码，统一携带服务方返回的可读描述。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{detail}")]
pub struct SynthesisError {
    pub detail: String,
}

impl SynthesisError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("failed to read {}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("failed to write {}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 复制文件失败
    #[error("failed to copy {} to {}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("failed to parse {}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// 缺少必填项
    #[error("{name} must not be empty")]
    Missing { name: &'static str },
    /// 数值超出范围
    #[error("{name} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    /// 文本段长度过小
    #[error("chunk_size {value} is below the minimum of {min}")]
    ChunkSizeTooSmall { value: usize, min: usize },
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
