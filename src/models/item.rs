use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 条目编号（在一个 Runner 内单调递增）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 条目状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// 状态机允许的迁移
    ///
    /// `Pending → Processing → {Completed | Failed}`，
    /// `Pending | Processing → Cancelled`。
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Processing => "processing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个输入文件到输出音频的转换任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub id: ItemId,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub status: ItemStatus,
    /// 进度百分比（0-100），只在 Processing 期间有意义
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 成功但需要提醒的情况（例如多段音频未合并）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl BatchItem {
    pub fn new(id: ItemId, input_file: PathBuf, output_file: PathBuf) -> Self {
        Self {
            id,
            input_file,
            output_file,
            status: ItemStatus::Pending,
            progress: 0,
            message: String::new(),
            error: None,
            warning: None,
        }
    }

    /// 按状态机迁移状态，非法迁移返回 false 且不做任何修改
    pub fn transition(&mut self, next: ItemStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match next {
            ItemStatus::Processing => self.progress = 0,
            ItemStatus::Completed => self.progress = 100,
            _ => {}
        }
        true
    }

    /// 标记失败并记录错误详情
    pub fn fail(&mut self, detail: impl Into<String>) -> bool {
        if !self.transition(ItemStatus::Failed) {
            return false;
        }
        let detail = detail.into();
        self.message = detail.clone();
        self.error = Some(detail);
        true
    }

    /// 文件名（用于日志显示）
    pub fn display_name(&self) -> String {
        self.input_file
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string()
    }
}

/// 批处理统计，每次都从当前条目列表重新计算
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// 带有警告的条目数
    pub warnings: usize,
}

impl BatchStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a BatchItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Processing => stats.processing += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Cancelled => stats.cancelled += 1,
            }
            if item.warning.is_some() {
                stats.warnings += 1;
            }
        }
        stats
    }

    /// 部分失败：有条目失败，同时也有条目成功。不视为整批失败。
    pub fn is_partial_failure(&self) -> bool {
        self.failed > 0 && self.completed > 0
    }

    /// 所有条目都已到达终止状态
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}
