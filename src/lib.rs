//! 古兰经跟读引擎
//!
//! 把语音识别结果逐词对齐到当前页的经文上，标记读对/读错，读完自动翻页，
//! 读错时给出震动和提示音反馈。

pub mod arabic;
pub mod config;
pub mod error;
pub mod feedback;
pub mod quran;
pub mod recognizer;
pub mod session;
pub mod tracker;

use std::path::Path;

use anyhow::Result;

pub use config::{AppConfig, CONFIG_LOCK};
pub use error::RecitationError;
pub use feedback::{FeedbackDispatcher, FeedbackSink};
pub use quran::{DirectoryTextProvider, PageData, StaticTextProvider, TextProvider};
pub use recognizer::{Finality, RecognizedToken, Recognizer, ScriptRecognizer, TokenScript};
pub use session::RecitationSession;
pub use tracker::{RecitationTracker, RenderSnapshot, TrackerState, WordView};

/// 加载配置（未指定路径时使用默认配置目录）
///
/// 持有配置锁，缺省字段被补齐时回写文件
pub fn load_persisted_config(path: Option<&Path>) -> Result<AppConfig> {
    let _guard = CONFIG_LOCK
        .lock()
        .map_err(|e| anyhow::anyhow!("获取配置锁失败: {}", e))?;

    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_path()?,
    };
    let (config, filled) = AppConfig::load_from(&path)?;
    if filled {
        if let Err(e) = config.save_to(&path) {
            tracing::warn!("回写配置失败: {}", e);
        }
    }
    Ok(config)
}
