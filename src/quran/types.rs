//! 页面数据类型定义

use serde::{Deserialize, Serialize};

use crate::arabic::NormalizedText;

/// 一节经文（ayah）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerseData {
    /// 经文标识（如 "2:255"）
    pub verse_key: String,
    /// 章内节号
    pub number_in_surah: u16,
    /// 原文词序列
    pub words: Vec<String>,
}

impl VerseData {
    /// 按空白切分整节原文
    pub fn from_text(verse_key: impl Into<String>, number_in_surah: u16, text: &str) -> Self {
        Self {
            verse_key: verse_key.into(),
            number_in_surah,
            words: text.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// 一页经文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageData {
    pub page_number: u16,
    pub verses: Vec<VerseData>,
}

/// 期望词
///
/// 由 [`WordIndex`](crate::quran::WordIndex) 构建，构建后不可变
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpectedWord {
    /// 在页内的节序号（从 0 开始）
    pub verse_index: usize,
    /// 在节内的词序号（从 0 开始，对应原始数据中的位置）
    pub word_index: usize,
    pub verse_key: String,
    pub raw: String,
    pub normalized: NormalizedText,
}

/// 词状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WordStatus {
    #[default]
    Pending,
    Correct,
    Incorrect,
}
