// 跟读回放工具：从目录加载页面，把识别脚本回放进跟读会话，打印每页结果
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::AsyncReadExt;

use quran_recite_lib::quran::WordStatus;
use quran_recite_lib::recognizer::{require_recognizer, Recognizer};
use quran_recite_lib::tracker::PagePolicy;
use quran_recite_lib::{
    load_persisted_config, DirectoryTextProvider, FeedbackDispatcher, RecitationSession,
    RenderSnapshot, ScriptRecognizer, TokenScript,
};

#[derive(Parser, Debug)]
#[command(name = "quran-recite")]
#[command(about = "Replay recognition results against Quran pages, word by word")]
#[command(version)]
struct Cli {
    /// 页面文件目录（<页码>.json）
    #[arg(long)]
    pages: PathBuf,

    /// 起始页（默认取配置中的 start_page）
    #[arg(long)]
    page: Option<u16>,

    /// 识别脚本文件，省略时从标准输入读取
    #[arg(long)]
    script: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// 关闭读错反馈
    #[arg(long)]
    no_feedback: bool,

    /// 相邻两个识别结果之间的间隔（毫秒）
    #[arg(long, default_value = "50")]
    pace_ms: u64,

    /// 以 JSON 输出快照
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = load_persisted_config(cli.config.as_deref())?;
    if let Some(page) = cli.page {
        config.pages.start_page = PagePolicy::new(&config.pages).validate(page)?;
    }

    let script = match &cli.script {
        Some(path) => TokenScript::load(path).await?,
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            TokenScript::parse(&content)
        }
    };
    // 空脚本视为没有识别能力
    let recognizer = (!script.is_empty()).then(|| {
        ScriptRecognizer::new(script).with_pace(Duration::from_millis(cli.pace_ms))
    });
    let mut recognizer = require_recognizer(recognizer)?;

    let feedback = if cli.no_feedback {
        FeedbackDispatcher::disabled()
    } else {
        FeedbackDispatcher::from_config(&config.feedback)
    };

    let session = RecitationSession::spawn(DirectoryTextProvider::new(&cli.pages), &config, feedback);
    tracing::info!("跟读会话 {} 开始回放", session.id());
    let initial = session.wait_for(|s| s.loading_page.is_none()).await?;
    if initial.page_number.is_none() {
        anyhow::bail!(
            "无法加载起始页: {}",
            initial.last_error.unwrap_or_default()
        );
    }

    let forwarder = session.listen(&mut recognizer).await?;
    forwarder.await?;
    recognizer.stop();

    session.flush().await?;
    session.wait_for(|s| s.loading_page.is_none()).await?;
    session.stop().await?;
    let last = session.flush().await?;
    let mut pages = session.finished_pages().await?;
    session.close().await;
    pages.push(last);

    for snapshot in &pages {
        if cli.json {
            println!("{}", snapshot.to_json()?);
        } else {
            print_page(snapshot);
        }
    }

    Ok(())
}

fn status_mark(status: WordStatus) -> &'static str {
    match status {
        WordStatus::Pending => "·",
        WordStatus::Correct => "✓",
        WordStatus::Incorrect => "✗",
    }
}

fn print_page(snapshot: &RenderSnapshot) {
    let Some(page) = snapshot.page_number else {
        return;
    };

    println!(
        "=== 第 {} 页  进度 {:.1}% ({}/{}) ===",
        page, snapshot.progress_percent, snapshot.cursor, snapshot.word_count
    );
    for verse in snapshot.verses() {
        let Some(first) = verse.first() else {
            continue;
        };
        let words: Vec<String> = verse
            .iter()
            .map(|w| {
                let word = format!("{}{}", w.raw, status_mark(w.status));
                if w.is_cursor {
                    format!("[{}]", word)
                } else {
                    word
                }
            })
            .collect();
        println!("  {:>7}  {}", first.verse_key, words.join(" "));
    }

    if !snapshot.mistakes.is_empty() {
        println!("读错 {} 处:", snapshot.mistakes.len());
        for mistake in &snapshot.mistakes {
            println!(
                "  {} 第 {} 词: 期望 \"{}\" 听到 \"{}\" ({:.2})",
                mistake.verse_key,
                mistake.word_index + 1,
                mistake.expected,
                mistake.heard,
                mistake.similarity
            );
        }
    }
    if let Some(error) = &snapshot.last_error {
        println!("错误: {}", error);
    }
    println!();
}
