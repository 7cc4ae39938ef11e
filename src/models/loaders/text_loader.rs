use crate::error::InputError;
use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一对输入文本与输出音频路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPair {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// 读取文本文件
///
/// 优先按 UTF-8 解码，失败时退回到单字节编码（Windows-1252，兼容 Latin-1）。
pub async fn read_text_file(path: &Path) -> Result<String, InputError> {
    let bytes = fs::read(path).await.map_err(|source| InputError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_text(bytes))
}

/// 将原始字节解码为文本
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let bytes = e.into_bytes();
            tracing::debug!("UTF-8 解码失败，改用 Windows-1252 ({} 字节)", bytes.len());
            let (text, _, _) = WINDOWS_1252.decode(&bytes);
            text.into_owned()
        }
    }
}

/// 根据输入文件名推导输出路径：`<output_folder>/<stem>.<format>`
pub fn output_path_for(input: &Path, output_folder: &Path, format: &str) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = output_folder.join(stem);
    output.set_extension(format);
    output
}

/// 扫描文件夹中的所有 `.txt` 文件，按文件名排序后生成输入/输出对
pub async fn collect_input_pairs(
    input_folder: &str,
    output_folder: &str,
    format: &str,
) -> Result<Vec<InputPair>> {
    let folder = PathBuf::from(input_folder);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", input_folder);
    }

    let mut inputs = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", input_folder))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("txt") {
            tracing::debug!(
                "发现文本文件: {}",
                path.file_name().unwrap_or_default().to_string_lossy()
            );
            inputs.push(path);
        }
    }
    inputs.sort();

    let output_folder = Path::new(output_folder);
    Ok(inputs
        .into_iter()
        .map(|input| InputPair {
            output: output_path_for(&input, output_folder, format),
            input,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_utf8() {
        assert_eq!(decode_text("Xin chào".as_bytes().to_vec()), "Xin chào");
    }

    #[test]
    fn test_decode_falls_back_to_single_byte() {
        // "café" in Latin-1
        assert_eq!(decode_text(vec![0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_output_path_replaces_extension() {
        let output = output_path_for(Path::new("/in/chapter 1.txt"), Path::new("/out"), "mp3");
        assert_eq!(output, PathBuf::from("/out/chapter 1.mp3"));
    }
}
