//! 语音合成能力 - 业务能力层
//!
//! 核心只依赖 `Synthesizer` 这个接口，具体的远程 API 由 `clients` 提供。

use crate::error::SynthesisError;
use crate::models::RunOptions;
use async_trait::async_trait;

/// 一次合成请求
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisRequest<'a> {
    pub text: &'a str,
    pub voice_id: &'a str,
    pub model_id: &'a str,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl<'a> SynthesisRequest<'a> {
    pub fn new(text: &'a str, options: &'a RunOptions) -> Self {
        Self {
            text,
            voice_id: &options.voice_id,
            model_id: &options.model_id,
            stability: options.stability,
            similarity_boost: options.similarity_boost,
        }
    }
}

/// 文本转语音
///
/// 任何非成功的响应都统一为 `SynthesisError`，其中只携带可读的描述。
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, SynthesisError>;
}
