use anyhow::Result;
use clap::Parser;
use tts_batch::orchestrator::{show_account_info, AccountQuery};
use tts_batch::utils::logging;
use tts_batch::{App, Config};

/// 批量文本转语音
#[derive(Parser, Debug)]
#[command(name = "tts_batch")]
#[command(about = "Convert a folder of text files to speech")]
#[command(version)]
struct Args {
    /// 列出可用声音后退出
    #[arg(long)]
    list_voices: bool,

    /// 列出可用模型后退出
    #[arg(long)]
    list_models: bool,

    /// 显示剩余额度后退出
    #[arg(long)]
    credits: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 加载配置
    let config = Config::from_env()?;

    // 初始化日志
    logging::init(config.verbose_logging);

    let query = AccountQuery {
        voices: args.list_voices,
        models: args.list_models,
        credits: args.credits,
    };
    if !query.is_empty() {
        return show_account_info(&config, query).await;
    }

    // 初始化并运行应用
    let stats = App::initialize(config).await?.run().await?;

    if stats.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
