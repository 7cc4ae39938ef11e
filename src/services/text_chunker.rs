//! 文本分段服务 - 业务能力层
//!
//! 只负责"把任意长度的文本切成有上限的片段"，不关心合成与流程。
//!
//! 切分点优先级（都必须位于窗口的后半段，空格为后三分之二）：
//! 1. 段落（`\n\n`）
//! 2. 换行（`\n`）
//! 3. 句末标点（`. ` `! ` `? `）
//! 4. 空格
//! 5. 以上都没有时在窗口末尾硬切
//!
//! 长度按字符（Unicode 标量值）计算。

use crate::error::InputError;
use crate::models::read_text_file;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::error;

const PARAGRAPH_BREAK: &[char] = &['\n', '\n'];
const LINE_BREAK: &[char] = &['\n'];
const SENTENCE_ENDS: [&[char]; 3] = [&['.', ' '], &['!', ' '], &['?', ' ']];
const SPACE: &[char] = &[' '];

fn excess_newlines() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(r"\n{3,}")).as_ref()
}

fn repeated_spaces() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(r" {2,}")).as_ref()
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            error!("❌ 预处理正则编译失败 {:?}: {}", pattern, e);
            None
        }
    }
}

/// 合成前的文本规整：3 个以上换行压成 2 个，制表符换成空格，连续空格压成 1 个
pub fn preprocess_text(text: &str) -> String {
    let text = match excess_newlines() {
        Some(re) => re.replace_all(text, "\n\n").into_owned(),
        None => {
            error!("⚠️ 跳过换行压缩：正则不可用");
            text.to_string()
        }
    };
    let text = text.replace('\t', " ");
    match repeated_spaces() {
        Some(re) => re.replace_all(&text, " ").into_owned(),
        None => {
            error!("⚠️ 跳过空格压缩：正则不可用");
            text
        }
    }
}

/// 预处理后切分
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    split_into_chunks(&preprocess_text(text), max_chunk_size)
}

/// 将已预处理的文本切成不超过 `max_chunk_size` 个字符的片段
///
/// 每段会去掉首尾空白，空段直接丢弃。
pub fn split_into_chunks(text: &str, max_chunk_size: usize) -> Vec<String> {
    let max = max_chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    let mut chunks = Vec::new();
    let mut current = 0;

    while current < len {
        let window_end = (current + max).min(len);
        let chunk_end = if window_end < len {
            find_break(&chars, current, window_end, max)
        } else {
            window_end
        };

        let chunk: String = chars[current..chunk_end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        current = chunk_end;
    }

    chunks
}

/// 在 `[start, end)` 内找切分点，返回本段的结束位置（不含）
fn find_break(chars: &[char], start: usize, end: usize, max: usize) -> usize {
    let half = start + max / 2;
    let third = start + max / 3;

    if let Some(pos) = rfind(chars, PARAGRAPH_BREAK, start, end).filter(|&p| p > half) {
        return pos + PARAGRAPH_BREAK.len();
    }
    if let Some(pos) = rfind(chars, LINE_BREAK, start, end).filter(|&p| p > half) {
        return pos + LINE_BREAK.len();
    }
    let sentence_end = SENTENCE_ENDS
        .iter()
        .filter_map(|pattern| rfind(chars, pattern, start, end))
        .max();
    if let Some(pos) = sentence_end.filter(|&p| p > half) {
        return pos + 2;
    }
    if let Some(pos) = rfind(chars, SPACE, start, end).filter(|&p| p > third) {
        return pos + SPACE.len();
    }
    end
}

/// 最后一次完整出现在 `[start, end)` 内的 `pattern` 的起始位置
fn rfind(chars: &[char], pattern: &[char], start: usize, end: usize) -> Option<usize> {
    if end < start + pattern.len() {
        return None;
    }
    (start..=end - pattern.len())
        .rev()
        .find(|&i| chars[i..i + pattern.len()] == *pattern)
}

/// 文本分段器
///
/// 持有片段上限，负责"读文件 → 预处理 → 切分"。
#[derive(Debug, Clone)]
pub struct TextChunker {
    max_chunk_size: usize,
}

impl TextChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.max_chunk_size)
    }

    /// 读取文件并返回可直接合成的片段
    pub async fn chunk_file(&self, path: &Path) -> Result<Vec<String>, InputError> {
        let text = read_text_file(path).await?;
        Ok(self.chunk(&text))
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(5000)
    }
}
