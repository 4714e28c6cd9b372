// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::arabic::{DEFAULT_LIVE_HIGHLIGHT_THRESHOLD, DEFAULT_MATCH_THRESHOLD};

// ============================================================================
// 全局配置操作锁
// ============================================================================

lazy_static::lazy_static! {
    /// 全局配置操作锁
    ///
    /// 保护所有 config 的读写操作，防止并发 load->modify->save 导致的数据丢失
    ///
    /// 使用方式：
    /// ```ignore
    /// let _guard = CONFIG_LOCK.lock().unwrap();
    /// let (mut config, _) = AppConfig::load()?;
    /// // 修改 config...
    /// config.save()?;
    /// ```
    pub static ref CONFIG_LOCK: Mutex<()> = Mutex::new(());
}

/// 古兰经总页数（Madani 版）
pub const QURAN_PAGE_COUNT: u16 = 604;

// ============================================================================
// 匹配配置
// ============================================================================

/// 匹配配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// 判定读对的相似度阈值（默认 0.78）
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// 实时高亮的相似度阈值（默认 0.5，严格大于）
    #[serde(default = "default_live_highlight_threshold")]
    pub live_highlight_threshold: f64,
}

fn default_match_threshold() -> f64 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_live_highlight_threshold() -> f64 {
    DEFAULT_LIVE_HIGHLIGHT_THRESHOLD
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            live_highlight_threshold: default_live_highlight_threshold(),
        }
    }
}

// ============================================================================
// 翻页配置
// ============================================================================

/// 读完最后一页时的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageWrap {
    /// 停在最后一页（默认）
    #[default]
    Clamp,
    /// 回到第 1 页
    Wrap,
}

/// 翻页配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_max_page")]
    pub max_page: u16,
    /// 启动时打开的页码
    #[serde(default = "default_start_page")]
    pub start_page: u16,
    #[serde(default)]
    pub wrap: PageWrap,
}

fn default_max_page() -> u16 {
    QURAN_PAGE_COUNT
}

fn default_start_page() -> u16 {
    1
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            max_page: default_max_page(),
            start_page: default_start_page(),
            wrap: PageWrap::default(),
        }
    }
}

// ============================================================================
// 反馈配置
// ============================================================================

/// 读错时的震动/提示音配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_enabled")]
    pub enabled: bool,
    /// 震动时长（毫秒）
    #[serde(default = "default_vibrate_ms")]
    pub vibrate_ms: u64,
    /// 提示音音量系数 (0.0 - 1.0)
    #[serde(default = "default_cue_volume")]
    pub cue_volume: f64,
}

fn default_feedback_enabled() -> bool {
    true
}

fn default_vibrate_ms() -> u64 {
    120
}

fn default_cue_volume() -> f64 {
    0.2
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: default_feedback_enabled(),
            vibrate_ms: default_vibrate_ms(),
            cue_volume: default_cue_volume(),
        }
    }
}

// ============================================================================
// 应用配置
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub matching: MatchConfig,
    #[serde(default)]
    pub pages: PageConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("match_threshold", self.matching.match_threshold),
            ("live_highlight_threshold", self.matching.live_highlight_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} 必须在 0.0 到 1.0 之间，当前为 {}", name, value);
            }
        }
        if self.pages.max_page == 0 {
            anyhow::bail!("max_page 不能为 0");
        }
        if self.pages.start_page == 0 || self.pages.start_page > self.pages.max_page {
            anyhow::bail!(
                "start_page {} 超出范围 1..={}",
                self.pages.start_page,
                self.pages.max_page
            );
        }
        if !(0.0..=1.0).contains(&self.feedback.cue_volume) {
            anyhow::bail!("cue_volume 必须在 0.0 到 1.0 之间");
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法获取配置目录"))?;
        let app_dir = config_dir.join("QuranRecite");
        std::fs::create_dir_all(&app_dir)?;
        Ok(app_dir.join("config.json"))
    }

    pub fn load() -> Result<(Self, bool)> {
        Self::load_from(&Self::config_path()?)
    }

    /// 从指定路径加载配置
    ///
    /// 返回 `(配置, 是否需要保存)`：文件中缺少的字段被默认值补齐时为 true
    pub fn load_from(path: &Path) -> Result<(Self, bool)> {
        tracing::info!("尝试从以下路径加载配置: {:?}", path);

        if !path.exists() {
            tracing::warn!("配置文件不存在，返回默认配置");
            return Ok((Self::new(), false));
        }

        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        let config: AppConfig = serde_json::from_value(value.clone())?;
        config.validate()?;

        // 补齐了缺省字段时建议回写
        let filled = serde_json::to_value(&config)? != value;
        if filled {
            tracing::info!("配置加载成功（补齐了缺省字段，建议保存）");
        } else {
            tracing::info!("配置加载成功");
        }
        Ok((config, filled))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content = serde_json::to_vec_pretty(self)?;
        replace_file(path, &content).with_context(|| format!("保存配置到 {:?} 失败", path))?;
        tracing::info!("配置已保存: {:?}", path);
        Ok(())
    }
}

/// 替换文件内容
///
/// 新内容先落盘到 `.tmp`，旧文件移到 `.bak`，替换失败时从 `.bak` 还原
fn replace_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let backup_path = path.with_extension("json.bak");

    let mut temp = File::create(&temp_path)?;
    temp.write_all(content)?;
    temp.sync_all()?;
    drop(temp);

    let has_previous = path.exists();
    if has_previous {
        let _ = fs::remove_file(&backup_path);
        fs::rename(path, &backup_path)?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        if has_previous {
            if let Err(restore) = fs::rename(&backup_path, path) {
                tracing::error!("还原配置备份失败: {}", restore);
            }
        }
        return Err(e);
    }

    if has_previous {
        let _ = fs::remove_file(&backup_path);
    }
    Ok(())
}
