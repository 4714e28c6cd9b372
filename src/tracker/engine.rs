//! 跟读状态机
//!
//! 持有光标、词状态表和实时高亮词，按顺序处理识别结果

use serde::Serialize;

use crate::arabic::{normalize, NormalizedText, Similarity};
use crate::config::MatchConfig;
use crate::quran::{ExpectedWord, PageData, WordIndex, WordStatus};
use crate::recognizer::{Finality, RecognizedToken};
use crate::tracker::mistakes::{Mistake, MistakeLog};
use crate::tracker::snapshot::{RenderSnapshot, WordView};

/// 状态机状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// 没有页面数据或未在识别
    #[default]
    Idle,
    /// 正在识别，光标在页内
    Listening,
    /// 光标已到页尾，等待翻页
    PageComplete,
}

/// 识别结果被忽略的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// 未在识别或没有页面数据
    NotListening,
    /// 规范化后为空
    EmptyRecognition,
    /// 光标已在页尾
    PageExhausted,
}

/// 处理一次识别结果的结果
#[derive(Debug, Clone, PartialEq)]
pub enum TokenOutcome {
    Ignored(IgnoreReason),
    /// 临时结果，只更新实时高亮词
    LiveUpdated { live_word: NormalizedText },
    /// 读对，光标前进
    Accepted {
        position: usize,
        similarity: f64,
        page_complete: bool,
    },
    /// 读错，光标不动
    Rejected { position: usize, similarity: f64 },
}

#[derive(Debug)]
struct LoadedPage {
    number: u16,
    index: WordIndex,
}

/// 跟读状态机
///
/// 不变式：
/// - `0 <= cursor <= word_count`
/// - 光标之前的词全部为 Correct，光标及之后的词不会是 Correct
#[derive(Debug)]
pub struct RecitationTracker {
    similarity: Similarity,
    page: Option<LoadedPage>,
    statuses: Vec<WordStatus>,
    cursor: usize,
    live_word: Option<NormalizedText>,
    listening: bool,
    mistakes: MistakeLog,
}

impl RecitationTracker {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            similarity: Similarity::new(config),
            page: None,
            statuses: Vec::new(),
            cursor: 0,
            live_word: None,
            listening: false,
            mistakes: MistakeLog::default(),
        }
    }

    pub fn state(&self) -> TrackerState {
        match &self.page {
            Some(page) if self.listening => {
                if self.cursor >= page.index.len() {
                    TrackerState::PageComplete
                } else {
                    TrackerState::Listening
                }
            }
            _ => TrackerState::Idle,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn page_number(&self) -> Option<u16> {
        self.page.as_ref().map(|p| p.number)
    }

    pub fn word_index(&self) -> Option<&WordIndex> {
        self.page.as_ref().map(|p| &p.index)
    }

    pub fn word_count(&self) -> usize {
        self.word_index().map_or(0, WordIndex::len)
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn statuses(&self) -> &[WordStatus] {
        &self.statuses
    }

    pub fn live_word(&self) -> Option<&NormalizedText> {
        self.live_word.as_ref()
    }

    pub fn mistakes(&self) -> &MistakeLog {
        &self.mistakes
    }

    /// 光标处的期望词
    pub fn expected_word(&self) -> Option<&ExpectedWord> {
        self.word_index()?.get(self.cursor)
    }

    /// 开始识别
    ///
    /// 已有页面时从上次的位置继续
    pub fn start(&mut self) {
        self.listening = true;
        tracing::info!(
            "开始跟读: 第 {:?} 页, 光标 {}/{}",
            self.page_number(),
            self.cursor,
            self.word_count()
        );
    }

    /// 停止识别
    ///
    /// 清空实时高亮词，保留光标和词状态
    pub fn stop(&mut self) {
        self.listening = false;
        self.live_word = None;
        tracing::info!("停止跟读: 光标 {}/{}", self.cursor, self.word_count());
    }

    /// 换页
    ///
    /// 整体替换词索引，光标归零，所有词重置为 Pending
    pub fn on_page_replaced(&mut self, page: PageData) {
        let index = WordIndex::build(&page);
        self.statuses = vec![WordStatus::Pending; index.len()];
        self.cursor = 0;
        self.live_word = None;
        tracing::info!(
            "已加载第 {} 页: {} 节, {} 词",
            page.page_number,
            index.verse_count(),
            index.len()
        );
        self.page = Some(LoadedPage {
            number: page.page_number,
            index,
        });
    }

    /// 处理一次识别结果
    ///
    /// 只取规范化文本的最后一个词与光标处的期望词比较
    pub fn on_token(&mut self, token: &RecognizedToken) -> TokenOutcome {
        if self.state() == TrackerState::Idle {
            return TokenOutcome::Ignored(IgnoreReason::NotListening);
        }

        let Some(candidate) = normalize(&token.text).last_word() else {
            return TokenOutcome::Ignored(IgnoreReason::EmptyRecognition);
        };

        if token.finality == Finality::Interim {
            self.live_word = Some(candidate.clone());
            return TokenOutcome::LiveUpdated {
                live_word: candidate,
            };
        }

        self.live_word = None;

        let Some(page) = &self.page else {
            return TokenOutcome::Ignored(IgnoreReason::NotListening);
        };
        let position = self.cursor;
        let Some(expected) = page.index.get(position) else {
            return TokenOutcome::Ignored(IgnoreReason::PageExhausted);
        };

        let score = self.similarity.score(&candidate, &expected.normalized);
        if score >= self.similarity.match_threshold() {
            self.statuses[position] = WordStatus::Correct;
            self.cursor += 1;
            let page_complete = self.cursor == page.index.len();
            tracing::debug!(
                "读对: [{}] \"{}\" ~ \"{}\" ({:.2})",
                position,
                candidate,
                expected.normalized,
                score
            );
            TokenOutcome::Accepted {
                position,
                similarity: score,
                page_complete,
            }
        } else {
            self.statuses[position] = WordStatus::Incorrect;
            tracing::debug!(
                "读错: [{}] \"{}\" vs \"{}\" ({:.2})",
                position,
                candidate,
                expected.normalized,
                score
            );
            let mistake = Mistake {
                page: page.number,
                verse_key: expected.verse_key.clone(),
                verse_index: expected.verse_index,
                word_index: expected.word_index,
                expected: expected.raw.clone(),
                heard: candidate.into_string(),
                similarity: score,
            };
            self.mistakes.record(mistake);
            TokenOutcome::Rejected {
                position,
                similarity: score,
            }
        }
    }

    /// 生成渲染快照
    pub fn snapshot(&self) -> RenderSnapshot {
        let Some(page) = &self.page else {
            return RenderSnapshot {
                listening: self.listening,
                ..Default::default()
            };
        };

        let word_count = page.index.len();
        let live_cursor = match (&self.live_word, page.index.get(self.cursor)) {
            (Some(live), Some(expected)) => self.similarity.is_live_match(live, &expected.normalized),
            _ => false,
        };

        let words = page
            .index
            .iter()
            .enumerate()
            .map(|(position, word)| {
                let is_cursor = position == self.cursor;
                WordView {
                    position,
                    verse_index: word.verse_index,
                    word_index: word.word_index,
                    verse_key: word.verse_key.clone(),
                    raw: word.raw.clone(),
                    status: self.statuses[position],
                    is_cursor,
                    is_live_highlighted: is_cursor && live_cursor,
                }
            })
            .collect();

        let progress_percent = if word_count == 0 {
            100.0
        } else {
            self.cursor as f64 * 100.0 / word_count as f64
        };

        // 读完时显示最后一节
        let current_verse = page
            .index
            .get(self.cursor)
            .or_else(|| word_count.checked_sub(1).and_then(|last| page.index.get(last)))
            .map(|w| w.verse_key.clone());

        RenderSnapshot {
            page_number: Some(page.number),
            state: self.state(),
            listening: self.listening,
            cursor: self.cursor,
            word_count,
            progress_percent,
            current_verse,
            live_word: self.live_word.as_ref().map(|w| w.to_string()),
            words,
            mistakes: self.mistakes.for_page(page.number).cloned().collect(),
            last_error: None,
            loading_page: None,
        }
    }
}

impl Default for RecitationTracker {
    fn default() -> Self {
        Self::new(&MatchConfig::default())
    }
}
