use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tts_batch::error::SynthesisError;
use tts_batch::orchestrator::{show_account_info, AccountQuery};
use tts_batch::{
    App, BatchEvent, BatchRunner, BatchStats, Config, ConversionFlow, ItemId, ItemStatus,
    ItemTicket, RunOptions, RunnerState, SynthesisRequest, Synthesizer, TextChunker,
};

fn options() -> RunOptions {
    RunOptions::new("voice", "eleven_turbo_v2", 0.5, 0.75)
}

fn runner_with(n: usize) -> BatchRunner {
    let runner = BatchRunner::with_item_delay(Duration::ZERO);
    for i in 1..=n {
        runner.enqueue(format!("in{}.txt", i), format!("out{}.mp3", i));
    }
    runner
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// 读取事件直到收到 `id` 迁移到 `status`，返回期间收到的全部事件
async fn wait_for_status(
    rx: &mut mpsc::UnboundedReceiver<BatchEvent>,
    id: ItemId,
    status: ItemStatus,
) -> Vec<BatchEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("等待事件超时")
            .expect("事件流已关闭");
        let hit = matches!(
            &event,
            BatchEvent::ItemStatusChanged(item) if item.id == id && item.status == status
        );
        seen.push(event);
        if hit {
            return seen;
        }
    }
}

fn completions(events: &[BatchEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, BatchEvent::BatchCompleted(_)))
        .count()
}

/// 记录调用，文本包含 `fail_on` 时返回错误
struct MockSynthesizer {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl MockSynthesizer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        })
    }

    fn failing_on(pattern: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_on: Some(pattern),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<Vec<u8>, SynthesisError> {
        assert_eq!(request.voice_id, "voice");
        assert_eq!(request.similarity_boost, 0.75);
        self.calls.lock().push(request.text.to_string());
        match self.fail_on {
            Some(pattern) if request.text.contains(pattern) => {
                Err(SynthesisError::new("API Error: boom"))
            }
            _ => Ok(format!("AUDIO:{}", request.text).into_bytes()),
        }
    }
}

fn flow_runner(synth: Arc<MockSynthesizer>, chunk_size: usize) -> BatchRunner {
    let runner = BatchRunner::with_item_delay(Duration::ZERO);
    runner.set_processor(ConversionFlow::new(TextChunker::new(chunk_size), synth));
    runner
}

async fn run_to_end(runner: &BatchRunner) -> BatchStats {
    assert!(runner.start(options()));
    runner.wait_finished().await;
    runner.stats()
}

// ========== Runner ==========

#[tokio::test]
async fn test_all_items_complete() {
    let runner = runner_with(4);
    runner.set_processor(|_t: ItemTicket, _o: Arc<RunOptions>| async { anyhow::Ok(true) });
    let (_handle, mut rx) = runner.subscribe();

    let stats = run_to_end(&runner).await;

    assert_eq!(stats.completed, 4);
    assert_eq!(stats.pending + stats.processing + stats.failed + stats.cancelled, 0);
    assert_eq!(runner.state(), RunnerState::Stopped);

    let events = drain(&mut rx);
    assert_eq!(completions(&events), 1);
    // 每个条目两次状态变化：Processing、Completed
    let transitions = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::ItemStatusChanged(_)))
        .count();
    assert_eq!(transitions, 8);
}

#[tokio::test]
async fn test_mixed_results_give_exact_stats() {
    let runner = runner_with(3);
    runner.set_processor(|ticket: ItemTicket, _o: Arc<RunOptions>| async move {
        anyhow::Ok(ticket.id() != ItemId(2))
    });

    let stats = run_to_end(&runner).await;

    assert_eq!(
        stats,
        BatchStats {
            total: 3,
            pending: 0,
            processing: 0,
            completed: 2,
            failed: 1,
            cancelled: 0,
            warnings: 0,
        }
    );
    assert!(stats.is_partial_failure());
}

#[tokio::test]
async fn test_processor_error_only_fails_that_item() {
    let runner = runner_with(5);
    runner.set_processor(|ticket: ItemTicket, _o: Arc<RunOptions>| async move {
        if ticket.id() == ItemId(3) {
            anyhow::bail!("disk full while writing {}", ticket.output_file().display());
        }
        anyhow::Ok(true)
    });

    let stats = run_to_end(&runner).await;

    assert_eq!(stats.completed, 4);
    assert_eq!(stats.failed, 1);
    let failed = runner.item(ItemId(3)).unwrap();
    assert_eq!(failed.status, ItemStatus::Failed);
    assert!(failed.message.contains("disk full while writing out3.mp3"));
    assert_eq!(failed.error.as_deref(), Some(failed.message.as_str()));
}

#[tokio::test]
async fn test_items_processed_in_enqueue_order() {
    let runner = runner_with(5);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    runner.set_processor(move |ticket: ItemTicket, _o: Arc<RunOptions>| {
        let recorder = recorder.clone();
        async move {
            recorder.lock().push(ticket.id());
            anyhow::Ok(true)
        }
    });

    run_to_end(&runner).await;

    assert_eq!(
        *seen.lock(),
        (1..=5).map(ItemId).collect::<Vec<_>>()
    );
}

/// 第 `blocked` 个条目会阻塞，直到测试放行
fn gated_processor(
    runner: &BatchRunner,
    blocked: ItemId,
) -> (Arc<Notify>, Arc<Notify>) {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (s, r) = (started.clone(), release.clone());
    runner.set_processor(move |ticket: ItemTicket, _o: Arc<RunOptions>| {
        let (s, r) = (s.clone(), r.clone());
        async move {
            if ticket.id() == blocked {
                s.notify_one();
                r.notified().await;
            }
            anyhow::Ok(true)
        }
    });
    (started, release)
}

#[tokio::test]
async fn test_cancel_mid_batch() {
    let runner = runner_with(5);
    let (started, release) = gated_processor(&runner, ItemId(2));
    let (_handle, mut rx) = runner.subscribe();

    assert!(runner.start(options()));
    started.notified().await;

    assert!(runner.cancel());
    // 第二次取消没有效果
    assert!(!runner.cancel());
    release.notify_one();
    runner.wait_finished().await;

    let stats = runner.stats();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.processing, 0);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 4);
    assert_eq!(runner.item(ItemId(1)).unwrap().status, ItemStatus::Completed);
    // 进行中的调用完成后结果被丢弃
    assert_eq!(runner.item(ItemId(2)).unwrap().status, ItemStatus::Cancelled);

    let events = drain(&mut rx);
    assert_eq!(completions(&events), 1);
    let cancelled_events = events
        .iter()
        .filter(|e| matches!(e, BatchEvent::ItemStatusChanged(i) if i.status == ItemStatus::Cancelled))
        .count();
    assert_eq!(cancelled_events, 4);
}

#[tokio::test]
async fn test_pause_takes_effect_after_current_item() {
    let runner = runner_with(5);
    let (started, release) = gated_processor(&runner, ItemId(2));
    let (_handle, mut rx) = runner.subscribe();

    assert!(runner.start(options()));
    started.notified().await;
    assert_eq!(runner.item(ItemId(2)).unwrap().status, ItemStatus::Processing);

    assert!(runner.pause());
    assert!(!runner.pause());
    release.notify_one();

    wait_for_status(&mut rx, ItemId(2), ItemStatus::Completed).await;
    assert_eq!(runner.item(ItemId(3)).unwrap().status, ItemStatus::Pending);
    assert_eq!(runner.state(), RunnerState::Paused);
    assert_eq!(runner.stats().pending, 3);

    assert!(runner.resume());
    runner.wait_finished().await;
    assert_eq!(runner.stats().completed, 5);
}

#[tokio::test]
async fn test_pause_during_last_item_still_finishes() {
    let runner = runner_with(2);
    let (started, release) = gated_processor(&runner, ItemId(2));
    let (_handle, mut rx) = runner.subscribe();

    assert!(runner.start(options()));
    started.notified().await;
    assert!(runner.pause());
    release.notify_one();

    // 队列已空，暂停不应让 worker 停留
    tokio::time::timeout(Duration::from_secs(2), runner.wait_finished())
        .await
        .expect("队列清空后 worker 应退出");

    assert_eq!(runner.state(), RunnerState::Stopped);
    let stats = runner.stats();
    assert_eq!(stats.completed, 2);
    assert!(stats.is_settled());
    assert_eq!(completions(&drain(&mut rx)), 1);

    // worker 已释放
    assert!(!runner.resume());
    assert!(runner.clear_all());
}

#[tokio::test]
async fn test_cancel_while_paused() {
    let runner = runner_with(3);
    let (started, release) = gated_processor(&runner, ItemId(1));
    let (_handle, mut rx) = runner.subscribe();

    assert!(runner.start(options()));
    started.notified().await;
    assert!(runner.pause());
    release.notify_one();
    wait_for_status(&mut rx, ItemId(1), ItemStatus::Completed).await;

    assert!(runner.cancel());
    runner.wait_finished().await;

    let stats = runner.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 2);
    assert_eq!(runner.state(), RunnerState::Stopped);
    assert_eq!(completions(&drain(&mut rx)), 1);
}

#[tokio::test]
async fn test_start_rejected_while_running() {
    let runner = runner_with(2);
    let (started, release) = gated_processor(&runner, ItemId(1));

    assert!(runner.start(options()));
    started.notified().await;
    assert!(!runner.start(options()));
    assert!(!runner.clear_all());

    // 运行中入队的条目同样会被处理
    runner.enqueue("late.txt", "late.mp3");
    release.notify_one();
    runner.wait_finished().await;

    assert_eq!(runner.stats().completed, 3);
}

// ========== ConversionFlow ==========

#[tokio::test]
async fn test_single_chunk_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("story.txt");
    let output = dir.path().join("audio/story.mp3");
    std::fs::write(&input, "Hello there.\t\tGeneral   Kenobi.").unwrap();

    let synth = MockSynthesizer::new();
    let runner = flow_runner(synth.clone(), 100);
    let item = runner.enqueue(&input, &output);

    let stats = run_to_end(&runner).await;

    assert_eq!(stats.completed, 1);
    assert_eq!(synth.calls(), vec!["Hello there. General Kenobi."]);
    assert_eq!(
        std::fs::read(&output).unwrap(),
        b"AUDIO:Hello there. General Kenobi."
    );
    let item = runner.item(item.id).unwrap();
    assert_eq!(item.message, "completed");
    assert!(item.warning.is_none());
    assert!(input.exists());
}

#[tokio::test]
async fn test_single_chunk_failure_uses_provider_detail() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("story.txt");
    let output = dir.path().join("story.mp3");
    std::fs::write(&input, "This one will boom.").unwrap();

    let synth = MockSynthesizer::failing_on("boom");
    let runner = flow_runner(synth.clone(), 100);
    let item = runner.enqueue(&input, &output);

    run_to_end(&runner).await;

    let item = runner.item(item.id).unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert_eq!(item.message, "API Error: boom");
    assert!(!output.exists());
}

const THREE_SENTENCES: &str = "First sentence is here. Second sentence is here. Third sentence is here.";

#[tokio::test]
async fn test_multi_chunk_writes_parts_and_promotes_first() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("long.txt");
    let output = dir.path().join("out/long.mp3");
    std::fs::write(&input, THREE_SENTENCES).unwrap();

    let synth = MockSynthesizer::new();
    let runner = flow_runner(synth.clone(), 30);
    let (_handle, mut rx) = runner.subscribe();
    let item = runner.enqueue(&input, &output);

    run_to_end(&runner).await;

    assert_eq!(
        synth.calls(),
        vec![
            "First sentence is here.",
            "Second sentence is here.",
            "Third sentence is here.",
        ]
    );
    for (index, text) in synth.calls().iter().enumerate() {
        let part = dir.path().join(format!("out/long_part{}.mp3", index + 1));
        assert_eq!(std::fs::read(part).unwrap(), format!("AUDIO:{}", text).into_bytes());
    }
    assert_eq!(
        std::fs::read(&output).unwrap(),
        b"AUDIO:First sentence is here."
    );

    let item = runner.item(item.id).unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    assert!(item.warning.unwrap().contains("3 parts were not combined"));
    assert_eq!(runner.stats().warnings, 1);

    let progress: Vec<u8> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            BatchEvent::ItemProgress(item) if item.message.ends_with("done") => Some(item.progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![33, 66, 100]);
}

#[tokio::test]
async fn test_multi_chunk_failure_stops_remaining_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("long.txt");
    let output = dir.path().join("long.mp3");
    std::fs::write(&input, THREE_SENTENCES).unwrap();

    let synth = MockSynthesizer::failing_on("Second");
    let runner = flow_runner(synth.clone(), 30);
    let item = runner.enqueue(&input, &output);

    run_to_end(&runner).await;

    assert_eq!(synth.calls().len(), 2);
    let item = runner.item(item.id).unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert_eq!(item.message, "chunk 2/3 failed: API Error: boom");
    assert!(dir.path().join("long_part1.mp3").exists());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_empty_input_never_calls_synthesizer() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty.txt");
    std::fs::write(&empty, " \n\n\t  \n").unwrap();
    let missing = dir.path().join("missing.txt");

    let synth = MockSynthesizer::new();
    let runner = flow_runner(synth.clone(), 100);
    let empty_item = runner.enqueue(&empty, dir.path().join("empty.mp3"));
    let missing_item = runner.enqueue(&missing, dir.path().join("missing.mp3"));

    let stats = run_to_end(&runner).await;

    assert_eq!(stats.failed, 2);
    assert!(synth.calls().is_empty());
    for id in [empty_item.id, missing_item.id] {
        let item = runner.item(id).unwrap();
        assert!(
            item.message.contains("empty or unreadable input"),
            "unexpected message: {}",
            item.message
        );
    }
}

#[tokio::test]
async fn test_legacy_encoding_is_decoded() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("latin1.txt");
    // "Café crème." in Latin-1
    std::fs::write(&input, b"Caf\xe9 cr\xe8me.").unwrap();

    let synth = MockSynthesizer::new();
    let runner = flow_runner(synth.clone(), 100);
    runner.enqueue(&input, dir.path().join("latin1.mp3"));

    run_to_end(&runner).await;

    assert_eq!(synth.calls(), vec!["Café crème."]);
}

// ========== App ==========

fn write_input(dir: &Path, name: &str, text: &str) {
    std::fs::write(dir.join(name), text).unwrap();
}

#[tokio::test]
async fn test_app_converts_folder_and_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("in");
    std::fs::create_dir_all(&input_dir).unwrap();
    write_input(&input_dir, "a.txt", "Hello there.");
    write_input(&input_dir, "b.txt", "");
    write_input(&input_dir, "notes.md", "ignored");

    let config = Config {
        input_folder: input_dir.to_string_lossy().to_string(),
        output_folder: dir.path().join("out").to_string_lossy().to_string(),
        report_file: dir.path().join("report.json").to_string_lossy().to_string(),
        output_log_file: dir.path().join("output.txt").to_string_lossy().to_string(),
        api_key: "test".to_string(),
        voice_id: "voice".to_string(),
        similarity_boost: 0.75,
        item_delay_ms: 0,
        ..Config::default()
    };
    let report_path = config.report_file.clone();

    let synth = MockSynthesizer::new();
    let app = App::with_synthesizer(config, synth.clone());
    let stats = tokio_test::assert_ok!(app.run().await);

    assert_eq!(stats.total, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert!(dir.path().join("out/a.mp3").exists());

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(report["stats"]["completed"], 1);
    assert_eq!(report["items"].as_array().unwrap().len(), 2);
    assert_eq!(report["items"][1]["status"], "failed");
}

#[tokio::test]
async fn test_account_info_requires_api_key() {
    let query = AccountQuery {
        voices: true,
        ..AccountQuery::default()
    };
    assert!(!query.is_empty());
    assert!(AccountQuery::default().is_empty());

    let err = show_account_info(&Config::default(), query).await.unwrap_err();
    assert!(format!("{:#}", err).contains("api_key must not be empty"));
}

#[tokio::test]
#[ignore] // 需要真实的 API Key：ELEVENLABS_API_KEY，cargo test -- --ignored
async fn test_real_api_lists_voices() {
    let config = Config::from_env().expect("加载配置失败");
    let client = tts_batch::clients::ElevenLabsClient::new(&config).expect("创建客户端失败");

    let voices = client.list_voices().await.expect("获取声音列表失败");
    assert!(!voices.is_empty());
    assert!(client.subscription().await.expect("获取额度失败").character_limit > 0);
}

#[tokio::test]
#[ignore] // 需要真实的 API Key：ELEVENLABS_API_KEY / VOICE_ID，cargo test -- --ignored
async fn test_real_api_synthesis() {
    let config = Config::from_env().expect("加载配置失败");
    let client = tts_batch::clients::ElevenLabsClient::new(&config).expect("创建客户端失败");
    let options = config.run_options();

    let audio = client
        .synthesize(&SynthesisRequest::new("Xin chào, đây là giọng đọc mẫu.", &options))
        .await
        .expect("合成失败");

    assert!(!audio.is_empty());
}
