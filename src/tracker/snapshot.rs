//! 渲染快照
//!
//! 渲染层只读取快照，不持有跟读状态

use serde::Serialize;

use crate::error::RecitationError;
use crate::quran::WordStatus;
use crate::tracker::engine::TrackerState;
use crate::tracker::mistakes::Mistake;

/// 单个词的渲染信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordView {
    /// 展平后的位置
    pub position: usize,
    pub verse_index: usize,
    pub word_index: usize,
    pub verse_key: String,
    pub raw: String,
    pub status: WordStatus,
    /// 是否为光标所在词
    pub is_cursor: bool,
    /// 是否处于实时高亮（临时识别结果与光标词接近）
    pub is_live_highlighted: bool,
}

/// 跟读状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderSnapshot {
    /// 当前页码，没有页面数据时为 None
    pub page_number: Option<u16>,
    pub state: TrackerState,
    pub listening: bool,
    pub cursor: usize,
    pub word_count: usize,
    /// 进度百分比 (0 - 100)
    pub progress_percent: f64,
    /// 当前经文标识
    pub current_verse: Option<String>,
    pub live_word: Option<String>,
    pub words: Vec<WordView>,
    /// 当前页的读错记录
    pub mistakes: Vec<Mistake>,
    /// 最近一次需要提示用户的错误
    pub last_error: Option<String>,
    /// 正在加载的页码
    pub loading_page: Option<u16>,
}

impl RenderSnapshot {
    /// 按节分组
    pub fn verses(&self) -> Vec<&[WordView]> {
        self.words
            .chunk_by(|a, b| a.verse_index == b.verse_index)
            .collect()
    }

    pub fn count_with_status(&self, status: WordStatus) -> usize {
        self.words.iter().filter(|w| w.status == status).count()
    }

    pub fn cursor_word(&self) -> Option<&WordView> {
        self.words.iter().find(|w| w.is_cursor)
    }

    pub fn to_json(&self) -> Result<String, RecitationError> {
        serde_json::to_string_pretty(self).map_err(|e| RecitationError::json("渲染快照", e))
    }
}
