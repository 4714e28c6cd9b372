//! 读错记录

use serde::Serialize;

/// 一次读错
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mistake {
    pub page: u16,
    pub verse_key: String,
    pub verse_index: usize,
    pub word_index: usize,
    /// 期望词原文
    pub expected: String,
    /// 听到的词（规范形式）
    pub heard: String,
    pub similarity: f64,
}

/// 读错记录（跨页保留，按页查询）
#[derive(Debug, Clone, Default)]
pub struct MistakeLog {
    entries: Vec<Mistake>,
}

impl MistakeLog {
    pub fn record(&mut self, mistake: Mistake) {
        tracing::debug!(
            "记录读错: 第 {} 页 {} 期望 \"{}\" 听到 \"{}\" ({:.2})",
            mistake.page,
            mistake.verse_key,
            mistake.expected,
            mistake.heard,
            mistake.similarity
        );
        self.entries.push(mistake);
    }

    pub fn for_page(&self, page: u16) -> impl Iterator<Item = &Mistake> {
        self.entries.iter().filter(move |m| m.page == page)
    }

    pub fn all(&self) -> &[Mistake] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
