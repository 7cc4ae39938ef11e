/// ElevenLabs API 客户端
///
/// 封装文本转语音接口的 HTTP 调用，对核心只暴露 `Synthesizer` 能力
use crate::config::Config;
use crate::error::SynthesisError;
use crate::services::{SynthesisRequest, Synthesizer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// API Key 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    Valid,
    /// 401：Key 无效或已过期
    Invalid,
    /// 其它错误码
    Unknown(u16),
}

/// 账户下可用的声音
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// 可用的合成模型
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Model {
    pub model_id: String,
    pub name: String,
    #[serde(default)]
    pub can_do_text_to_speech: bool,
}

/// 订阅与额度信息
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub tier: String,
    #[serde(default)]
    pub character_count: u64,
    #[serde(default)]
    pub character_limit: u64,
}

impl Subscription {
    /// 剩余可用字符数
    pub fn remaining_characters(&self) -> u64 {
        self.character_limit.saturating_sub(self.character_count)
    }
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs 客户端
pub struct ElevenLabsClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    /// 创建新的客户端
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("无法创建 HTTP 客户端")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// 校验 API Key
    pub async fn validate_api_key(&self) -> Result<KeyStatus> {
        let url = format!("{}/user/subscription", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("无法连接到 ElevenLabs API: {}", url))?;

        let status = response.status();
        debug!(status_code = status.as_u16(), "API Key 校验响应");

        Ok(match status {
            s if s.is_success() => KeyStatus::Valid,
            StatusCode::UNAUTHORIZED => KeyStatus::Invalid,
            s => KeyStatus::Unknown(s.as_u16()),
        })
    }

    /// 列出账户下可用的声音
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let body = self.get_json("voices").await?;
        let response: VoicesResponse =
            serde_json::from_str(&body).context("无法解析声音列表")?;
        Ok(response.voices)
    }

    /// 列出可用的模型
    pub async fn list_models(&self) -> Result<Vec<Model>> {
        let body = self.get_json("models").await?;
        serde_json::from_str(&body).context("无法解析模型列表")
    }

    /// 查询订阅与额度
    pub async fn subscription(&self) -> Result<Subscription> {
        let body = self.get_json("user/subscription").await?;
        serde_json::from_str(&body).context("无法解析订阅信息")
    }

    async fn get_json(&self, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("无法连接到 ElevenLabs API: {}", url))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(status_code = status.as_u16(), "GET {}", path);
        if !status.is_success() {
            anyhow::bail!(error_message(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsClient {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, SynthesisError> {
        let url = format!("{}/text-to-speech/{}", self.base_url, request.voice_id);
        let body = TtsBody {
            text: request.text,
            model_id: request.model_id,
            voice_settings: VoiceSettings {
                stability: request.stability,
                similarity_boost: request.similarity_boost,
            },
        };

        debug!(
            "正在调用合成接口，模型: {}，文本长度: {} 字符",
            request.model_id,
            request.text.chars().count()
        );

        let response = self
            .http
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::new(format!("Error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let audio = response
                .bytes()
                .await
                .map_err(|e| SynthesisError::new(format!("Error: {}", e)))?;
            return Ok(audio.to_vec());
        }

        let raw = response.text().await.unwrap_or_default();
        let message = error_message(status, &raw);
        warn!("合成接口调用失败: {}", message);
        Err(SynthesisError::new(message))
    }
}

/// 从错误响应中提取可读的描述
///
/// `detail` 可能是字符串，也可能是带 `message` 字段的对象。
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("detail").cloned())
        .and_then(|detail| match &detail {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => Some(
                map.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| detail.to_string()),
            ),
            Value::Null => None,
            other => Some(other.to_string()),
        });

    match detail {
        Some(detail) => format!("API Error: {}", detail),
        None => format!("API Error: {}", status.as_u16()),
    }
}
