//! 批处理队列与 Runner - 编排层
//!
//! ## 职责
//!
//! 持有条目列表和待处理队列，由单个后台 worker 按入队顺序逐个处理。
//!
//! ## 核心功能
//!
//! 1. **入队**：`enqueue` 追加 Pending 条目，运行中入队的条目同样会被处理
//! 2. **启动**：`start` 在 tokio 运行时上启动 worker，立即返回
//! 3. **暂停 / 恢复 / 取消**：协作式，只在条目之间生效，进行中的调用总会完成
//! 4. **观察者**：状态变化、进度、整批完成都会通知已注册的观察者
//! 5. **统计**：`stats` 每次都从当前条目列表重新计算
//!
//! ## 并发约定
//!
//! - 条目列表与队列由同一把锁保护，入队、取消、出队各自是一个临界区
//! - 持锁期间不 `.await`，也不调用观察者
//! - 观察者在 worker 所在的任务（或调用 `cancel` 的上下文）中被调用，
//!   需要切换执行上下文的消费者自行负责

use crate::models::{BatchItem, BatchStats, InputPair, ItemId, ItemStatus, RunOptions};
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// 条目之间的默认间隔
pub const DEFAULT_ITEM_DELAY: Duration = Duration::from_millis(100);

/// Runner 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// 从未启动
    Idle,
    Running,
    Paused,
    /// 已处理完或已取消
    Stopped,
}

/// 单个条目的处理函数
///
/// 返回 `Ok(true)` 视为完成，`Ok(false)` 视为失败；
/// 返回错误或发生 panic 时条目标记为失败，错误详情写入条目消息。
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn process(&self, ticket: ItemTicket, options: Arc<RunOptions>) -> anyhow::Result<bool>;
}

#[async_trait]
impl<F, Fut> ItemProcessor for F
where
    F: Fn(ItemTicket, Arc<RunOptions>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    async fn process(&self, ticket: ItemTicket, options: Arc<RunOptions>) -> anyhow::Result<bool> {
        (self)(ticket, options).await
    }
}

/// 批处理观察者
///
/// 所有方法都有空的默认实现，按需覆盖即可。观察者 panic 不会影响 worker。
pub trait BatchObserver: Send + Sync {
    /// 每次状态迁移后调用
    fn on_item_status_changed(&self, _item: &BatchItem) {}
    /// 处理中条目的进度或消息更新
    fn on_item_progress(&self, _item: &BatchItem) {}
    /// worker 退出时调用且只调用一次（正常完成或取消）
    fn on_batch_completed(&self, _stats: &BatchStats) {}
}

/// 观察者注册句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// 事件流中的事件
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    ItemStatusChanged(BatchItem),
    ItemProgress(BatchItem),
    BatchCompleted(BatchStats),
}

/// 把观察者回调转成 channel 事件
struct ChannelObserver {
    tx: mpsc::UnboundedSender<BatchEvent>,
}

impl BatchObserver for ChannelObserver {
    fn on_item_status_changed(&self, item: &BatchItem) {
        let _ = self.tx.send(BatchEvent::ItemStatusChanged(item.clone()));
    }

    fn on_item_progress(&self, item: &BatchItem) {
        let _ = self.tx.send(BatchEvent::ItemProgress(item.clone()));
    }

    fn on_batch_completed(&self, stats: &BatchStats) {
        let _ = self.tx.send(BatchEvent::BatchCompleted(*stats));
    }
}

/// 交给处理函数的条目凭证
///
/// 携带输入/输出路径，并允许在处理过程中回报进度。
#[derive(Clone)]
pub struct ItemTicket {
    id: ItemId,
    input_file: PathBuf,
    output_file: PathBuf,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ItemTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemTicket")
            .field("id", &self.id)
            .field("input_file", &self.input_file)
            .field("output_file", &self.output_file)
            .finish()
    }
}

impl ItemTicket {
    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn input_file(&self) -> &Path {
        &self.input_file
    }

    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// 更新进度与消息，只在条目处于 Processing 时生效
    pub fn report_progress(&self, progress: u8, message: impl Into<String>) {
        let message = message.into();
        self.update(|item| {
            item.progress = progress.min(100);
            item.message = message;
        });
    }

    /// 只更新消息
    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|item| item.message = message);
    }

    /// 记录警告（条目仍可正常完成）
    pub fn set_warning(&self, warning: impl Into<String>) {
        let warning = warning.into();
        self.update(|item| item.warning = Some(warning));
    }

    fn update(&self, apply: impl FnOnce(&mut BatchItem)) {
        let snapshot = {
            let mut inner = self.shared.inner.lock();
            match inner.item_mut(self.id) {
                Some(item) if item.status == ItemStatus::Processing => {
                    apply(item);
                    item.clone()
                }
                _ => return,
            }
        };
        self.shared
            .notify(|observer| observer.on_item_progress(&snapshot));
    }
}

struct Inner {
    items: Vec<BatchItem>,
    queue: VecDeque<ItemId>,
    processor: Option<Arc<dyn ItemProcessor>>,
    worker_active: bool,
    next_id: u64,
}

impl Inner {
    fn item_mut(&mut self, id: ItemId) -> Option<&mut BatchItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }
}

/// worker 下一步要做的事
enum Next {
    Item(BatchItem),
    Paused,
    Done,
}

struct Shared {
    inner: Mutex<Inner>,
    observers: Mutex<Vec<(ObserverHandle, Arc<dyn BatchObserver>)>>,
    next_observer: AtomicU64,
    state: watch::Sender<RunnerState>,
    finished: watch::Sender<bool>,
    item_delay: Duration,
}

impl Shared {
    fn state(&self) -> RunnerState {
        *self.state.borrow()
    }

    /// 逐个通知观察者，单个观察者 panic 只记录日志
    fn notify(&self, call: impl Fn(&dyn BatchObserver)) {
        let observers: Vec<Arc<dyn BatchObserver>> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            if let Err(payload) =
                std::panic::catch_unwind(AssertUnwindSafe(|| call(observer.as_ref())))
            {
                error!("观察者回调发生 panic，已忽略: {}", panic_message(&*payload));
            }
        }
    }

    /// 出队一个 Pending 条目并迁移到 Processing
    ///
    /// 队列为空时直接结束，即使处于 Paused。
    fn begin_next(&self) -> Next {
        let mut inner = self.inner.lock();
        loop {
            if inner.queue.is_empty() {
                return Next::Done;
            }
            match self.state() {
                RunnerState::Running => {}
                RunnerState::Paused => return Next::Paused,
                RunnerState::Idle | RunnerState::Stopped => return Next::Done,
            }

            let Some(id) = inner.queue.pop_front() else {
                return Next::Done;
            };

            if let Some(item) = inner.item_mut(id) {
                if item.transition(ItemStatus::Processing) {
                    item.message.clear();
                    return Next::Item(item.clone());
                }
            }
            debug!("跳过不再处于 Pending 的条目 {}", id);
        }
    }

    /// 写入处理结果；条目在调用期间被取消时丢弃结果
    fn finish_item(
        &self,
        id: ItemId,
        outcome: Result<anyhow::Result<bool>, Box<dyn Any + Send>>,
    ) -> Option<BatchItem> {
        let mut inner = self.inner.lock();
        let item = inner.item_mut(id)?;

        if item.status != ItemStatus::Processing {
            debug!("条目 {} 已是 {}，丢弃处理结果", id, item.status);
            return None;
        }

        match outcome {
            Ok(Ok(true)) => {
                item.transition(ItemStatus::Completed);
                if item.message.is_empty() {
                    item.message = "completed".to_string();
                }
            }
            Ok(Ok(false)) => {
                let detail = if item.message.is_empty() {
                    "processing failed".to_string()
                } else {
                    item.message.clone()
                };
                item.fail(detail);
            }
            Ok(Err(e)) => {
                item.fail(format!("{:#}", e));
            }
            Err(payload) => {
                item.fail(format!("processor panicked: {}", panic_message(&*payload)));
            }
        }

        Some(item.clone())
    }

    /// worker 退出：状态置为 Stopped，返回最终统计
    fn end_run(&self) -> BatchStats {
        let inner = self.inner.lock();
        self.state.send_replace(RunnerState::Stopped);
        BatchStats::from_items(&inner.items)
    }

    /// 完成通知发出之后才释放 worker 标记
    fn release_worker(&self) {
        let mut inner = self.inner.lock();
        inner.worker_active = false;
        self.finished.send_replace(true);
    }
}

/// 批处理 Runner
///
/// 可廉价克隆，所有克隆共享同一个队列。
#[derive(Clone)]
pub struct BatchRunner {
    shared: Arc<Shared>,
}

impl BatchRunner {
    pub fn new() -> Self {
        Self::with_item_delay(DEFAULT_ITEM_DELAY)
    }

    /// 指定条目之间的间隔
    pub fn with_item_delay(item_delay: Duration) -> Self {
        let (state, _) = watch::channel(RunnerState::Idle);
        let (finished, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    items: Vec::new(),
                    queue: VecDeque::new(),
                    processor: None,
                    worker_active: false,
                    next_id: 1,
                }),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
                state,
                finished,
                item_delay,
            }),
        }
    }

    /// 追加一个条目（Pending）到列表和队列
    pub fn enqueue(&self, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> BatchItem {
        let mut inner = self.shared.inner.lock();
        let id = ItemId(inner.next_id);
        inner.next_id += 1;

        let item = BatchItem::new(id, input.into(), output.into());
        inner.items.push(item.clone());
        inner.queue.push_back(id);
        item
    }

    pub fn enqueue_many(&self, pairs: impl IntoIterator<Item = InputPair>) -> Vec<BatchItem> {
        pairs
            .into_iter()
            .map(|pair| self.enqueue(pair.input, pair.output))
            .collect()
    }

    /// 安装处理函数，必须在 `start` 之前调用
    pub fn set_processor<P>(&self, processor: P)
    where
        P: ItemProcessor + 'static,
    {
        self.shared.inner.lock().processor = Some(Arc::new(processor));
    }

    pub fn add_observer(&self, observer: Arc<dyn BatchObserver>) -> ObserverHandle {
        let handle = ObserverHandle(self.shared.next_observer.fetch_add(1, Ordering::Relaxed));
        self.shared.observers.lock().push((handle, observer));
        handle
    }

    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        let mut observers = self.shared.observers.lock();
        let before = observers.len();
        observers.retain(|(h, _)| *h != handle);
        observers.len() != before
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> (ObserverHandle, mpsc::UnboundedReceiver<BatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.add_observer(Arc::new(ChannelObserver { tx }));
        (handle, rx)
    }

    /// 启动 worker
    ///
    /// 已有 worker 在运行、未安装处理函数或不在 tokio 运行时中时返回 false。
    pub fn start(&self, options: RunOptions) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("⚠️ 无法启动：当前不在 tokio 运行时中");
            return false;
        };

        let processor = {
            let mut inner = self.shared.inner.lock();
            if inner.worker_active {
                warn!("⚠️ 批处理已在运行中");
                return false;
            }
            let Some(processor) = inner.processor.clone() else {
                warn!("⚠️ 尚未设置处理函数");
                return false;
            };
            inner.worker_active = true;
            self.shared.finished.send_replace(false);
            self.shared.state.send_replace(RunnerState::Running);
            info!("▶️ 批处理开始，待处理 {} 个条目", inner.queue.len());
            processor
        };

        runtime.spawn(run_worker(
            self.shared.clone(),
            processor,
            Arc::new(options),
        ));
        true
    }

    /// 暂停：当前条目处理完后才生效
    pub fn pause(&self) -> bool {
        let paused = self.shared.state.send_if_modified(|state| {
            if *state == RunnerState::Running {
                *state = RunnerState::Paused;
                true
            } else {
                false
            }
        });
        if paused {
            info!("⏸️ 批处理已暂停（当前条目完成后生效）");
        }
        paused
    }

    pub fn resume(&self) -> bool {
        let resumed = self.shared.state.send_if_modified(|state| {
            if *state == RunnerState::Paused {
                *state = RunnerState::Running;
                true
            } else {
                false
            }
        });
        if resumed {
            info!("▶️ 批处理已恢复");
        }
        resumed
    }

    /// 取消：Pending / Processing 条目全部标记为 Cancelled，清空队列
    ///
    /// 未在运行时什么都不做并返回 false。
    pub fn cancel(&self) -> bool {
        let cancelled: Vec<BatchItem> = {
            let mut inner = self.shared.inner.lock();
            let stopped = self.shared.state.send_if_modified(|state| {
                if matches!(*state, RunnerState::Running | RunnerState::Paused) {
                    *state = RunnerState::Stopped;
                    true
                } else {
                    false
                }
            });
            if !stopped {
                return false;
            }

            inner.queue.clear();
            inner
                .items
                .iter_mut()
                .filter_map(|item| {
                    if item.transition(ItemStatus::Cancelled) {
                        item.message = "cancelled".to_string();
                        Some(item.clone())
                    } else {
                        None
                    }
                })
                .collect()
        };

        info!("⏹️ 批处理已取消，{} 个条目标记为取消", cancelled.len());
        for item in &cancelled {
            self.shared
                .notify(|observer| observer.on_item_status_changed(item));
        }
        true
    }

    pub fn state(&self) -> RunnerState {
        self.shared.state()
    }

    /// Running 或 Paused
    pub fn is_running(&self) -> bool {
        matches!(self.state(), RunnerState::Running | RunnerState::Paused)
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats::from_items(&self.shared.inner.lock().items)
    }

    pub fn items(&self) -> Vec<BatchItem> {
        self.shared.inner.lock().items.clone()
    }

    pub fn item(&self, id: ItemId) -> Option<BatchItem> {
        self.shared
            .inner
            .lock()
            .items
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// 移除已完成和已取消的条目，返回移除数量
    pub fn clear_completed(&self) -> usize {
        let mut inner = self.shared.inner.lock();
        let before = inner.items.len();
        inner
            .items
            .retain(|item| !matches!(item.status, ItemStatus::Completed | ItemStatus::Cancelled));
        before - inner.items.len()
    }

    /// 清空全部条目和队列，worker 运行期间拒绝执行
    pub fn clear_all(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.worker_active {
            return false;
        }
        inner.queue.clear();
        inner.items.clear();
        true
    }

    /// 等待 worker 退出（完成通知已发出）
    pub async fn wait_finished(&self) {
        let mut rx = self.shared.finished.subscribe();
        loop {
            let done = *rx.borrow_and_update();
            if done || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(shared: Arc<Shared>, processor: Arc<dyn ItemProcessor>, options: Arc<RunOptions>) {
    let mut state_rx = shared.state.subscribe();

    loop {
        let item = match shared.begin_next() {
            Next::Item(item) => item,
            Next::Paused => {
                if wait_while_paused(&mut state_rx).await == RunnerState::Stopped {
                    break;
                }
                continue;
            }
            Next::Done => break,
        };

        debug!("[条目 {}] 开始处理: {}", item.id, item.display_name());
        shared.notify(|observer| observer.on_item_status_changed(&item));

        let ticket = ItemTicket {
            id: item.id,
            input_file: item.input_file.clone(),
            output_file: item.output_file.clone(),
            shared: shared.clone(),
        };
        let outcome = AssertUnwindSafe(processor.process(ticket, options.clone()))
            .catch_unwind()
            .await;

        if let Some(finished) = shared.finish_item(item.id, outcome) {
            shared.notify(|observer| observer.on_item_status_changed(&finished));
        }

        if !shared.item_delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(shared.item_delay) => {}
                _ = wait_until_stopped(&mut state_rx) => {}
            }
        }
    }

    let stats = shared.end_run();
    info!(
        "🏁 批处理结束: 完成 {}, 失败 {}, 取消 {}, 共 {}",
        stats.completed, stats.failed, stats.cancelled, stats.total
    );
    shared.notify(|observer| observer.on_batch_completed(&stats));
    shared.release_worker();
}

/// 等到状态不再是 Paused，返回新的状态
async fn wait_while_paused(rx: &mut watch::Receiver<RunnerState>) -> RunnerState {
    loop {
        let state = *rx.borrow_and_update();
        if state != RunnerState::Paused {
            return state;
        }
        if rx.changed().await.is_err() {
            return RunnerState::Stopped;
        }
    }
}

async fn wait_until_stopped(rx: &mut watch::Receiver<RunnerState>) {
    loop {
        let state = *rx.borrow_and_update();
        if state == RunnerState::Stopped || rx.changed().await.is_err() {
            return;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
