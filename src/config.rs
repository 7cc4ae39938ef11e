use crate::error::{AppResult, ConfigError, FileError};
use crate::models::RunOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 单个文本段允许的最小字符数
pub const MIN_CHUNK_SIZE: usize = 100;

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 待转换的文本目录
    pub input_folder: String,
    /// 音频输出目录
    pub output_folder: String,
    /// 输出文件扩展名
    pub output_format: String,
    // --- 语音合成 API 配置 ---
    pub api_key: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    // --- 合成参数 ---
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    /// 每次请求的最大字符数
    pub chunk_size: usize,
    /// 条目之间的间隔（毫秒）
    pub item_delay_ms: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 批处理报告（JSON）
    pub report_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_folder: "input_text".to_string(),
            output_folder: "output_audio".to_string(),
            output_format: "mp3".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.elevenlabs.io/v1".to_string(),
            request_timeout_secs: 120,
            voice_id: String::new(),
            model_id: "eleven_turbo_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            chunk_size: 5000,
            item_delay_ms: 100,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            report_file: "batch_report.json".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 若设置了 `TTS_CONFIG_FILE`，先读取该 TOML 文件作为基础，再用环境变量覆盖。
    pub fn from_env() -> AppResult<Self> {
        let base = match std::env::var("TTS_CONFIG_FILE") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| {
            FileError::TomlParseFailed {
                path: path.to_path_buf(),
                source,
            }
            .into()
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn with_env_overrides(self) -> Self {
        Self {
            input_folder: env_or("INPUT_FOLDER", self.input_folder),
            output_folder: env_or("OUTPUT_FOLDER", self.output_folder),
            output_format: env_or("OUTPUT_FORMAT", self.output_format),
            api_key: env_or("ELEVENLABS_API_KEY", self.api_key),
            api_base_url: env_or("ELEVENLABS_API_BASE_URL", self.api_base_url),
            request_timeout_secs: env_parse_or("REQUEST_TIMEOUT_SECS", self.request_timeout_secs),
            voice_id: env_or("VOICE_ID", self.voice_id),
            model_id: env_or("MODEL_ID", self.model_id),
            stability: env_parse_or("STABILITY", self.stability),
            similarity_boost: env_parse_or("SIMILARITY_BOOST", self.similarity_boost),
            chunk_size: env_parse_or("CHUNK_SIZE", self.chunk_size),
            item_delay_ms: env_parse_or("ITEM_DELAY_MS", self.item_delay_ms),
            verbose_logging: env_parse_or("VERBOSE_LOGGING", self.verbose_logging),
            output_log_file: env_or("OUTPUT_LOG_FILE", self.output_log_file),
            report_file: env_or("REPORT_FILE", self.report_file),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing { name: "api_key" });
        }
        if self.voice_id.trim().is_empty() {
            return Err(ConfigError::Missing { name: "voice_id" });
        }
        if self.chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::ChunkSizeTooSmall {
                value: self.chunk_size,
                min: MIN_CHUNK_SIZE,
            });
        }
        self.run_options().validate()
    }

    /// 本次批处理的参数快照
    pub fn run_options(&self) -> RunOptions {
        RunOptions::new(
            self.voice_id.clone(),
            self.model_id.clone(),
            self.stability,
            self.similarity_boost,
        )
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_or(name: &str, fallback: String) -> String {
    std::env::var(name).unwrap_or(fallback)
}

fn env_parse_or<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}
