use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// 一次批处理的合成参数快照
///
/// 在 `start` 时捕获，之后本批所有条目只读共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl RunOptions {
    pub fn new(
        voice_id: impl Into<String>,
        model_id: impl Into<String>,
        stability: f32,
        similarity_boost: f32,
    ) -> Self {
        Self {
            voice_id: voice_id.into(),
            model_id: model_id.into(),
            stability,
            similarity_boost,
        }
    }

    /// stability 与 similarity_boost 必须在 [0, 1] 内
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_range("stability", self.stability)?;
        check_unit_range("similarity_boost", self.similarity_boost)
    }
}

fn check_unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: f64::from(value),
            min: 0.0,
            max: 1.0,
        })
    }
}
