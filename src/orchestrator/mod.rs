//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量转换处理器
//! - 管理应用生命周期（初始化、运行、报告）
//! - 扫描输入目录，批量入队
//! - 处理 Ctrl-C 中断
//! - 输出全局统计信息
//! - 查询账户的声音、模型与额度
//!
//! ### `batch_runner` - 队列与 worker
//! - 维护条目列表与待处理队列
//! - 单个 worker 严格按入队顺序处理
//! - 暂停 / 恢复 / 取消
//! - 观察者通知与统计
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<InputPair>)
//!     ↓
//! batch_runner (逐个驱动 BatchItem)
//!     ↓
//! workflow::ConversionFlow (处理单个条目)
//!     ↓
//! services (能力层：chunk / synthesize / write)
//!     ↓
//! clients (外部 API：ElevenLabs)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管应用，batch_runner 管队列
//! 2. **资源隔离**：只有编排层持有合成客户端
//! 3. **向下依赖**：编排层 → workflow → services → clients
//! 4. **无业务逻辑**：只做调度和统计，不做具体转换判断

pub mod batch_processor;
pub mod batch_runner;

// 重新导出主要类型
pub use batch_processor::{show_account_info, AccountQuery, App};
pub use batch_runner::{
    BatchEvent, BatchObserver, BatchRunner, ItemProcessor, ItemTicket, ObserverHandle, RunnerState,
};
