//! 词索引
//!
//! 把一页的节/词结构展平为有序的期望词序列，保留 (节, 词) 坐标

use crate::arabic::{normalize, split_words};
use crate::quran::types::{ExpectedWord, PageData};

/// 页面词索引
///
/// 每次换页整体重建，不做增量修改
#[derive(Debug, Clone, Default)]
pub struct WordIndex {
    words: Vec<ExpectedWord>,
    verse_count: usize,
}

impl WordIndex {
    /// 构建词索引
    ///
    /// 规范化后为空的词（纯标点、停顿符号）被跳过。
    /// 原文词内部带标点时（如 `قَالَ،رَبِّ`）拆成多个期望词，共用同一坐标
    pub fn build(page: &PageData) -> Self {
        let mut words = Vec::new();

        for (verse_index, verse) in page.verses.iter().enumerate() {
            for (word_index, raw) in verse.words.iter().enumerate() {
                for part in split_words(raw) {
                    let normalized = normalize(part);
                    if normalized.is_empty() {
                        continue;
                    }
                    words.push(ExpectedWord {
                        verse_index,
                        word_index,
                        verse_key: verse.verse_key.clone(),
                        raw: part.to_string(),
                        normalized,
                    });
                }
            }
        }

        tracing::debug!(
            "第 {} 页词索引构建完成: {} 节, {} 词",
            page.page_number,
            page.verses.len(),
            words.len()
        );

        Self {
            words,
            verse_count: page.verses.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ExpectedWord> {
        self.words.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpectedWord> {
        self.words.iter()
    }

    pub fn verse_count(&self) -> usize {
        self.verse_count
    }
}
