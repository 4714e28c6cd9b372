//! 相似度打分
//!
//! 基于编辑距离的有界相似度，用作"读得够接近"的判定依据

use strsim::levenshtein;

use crate::arabic::normalizer::{normalize, NormalizedText};
use crate::config::MatchConfig;

/// 默认匹配阈值
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.78;

/// 默认实时高亮阈值
pub const DEFAULT_LIVE_HIGHLIGHT_THRESHOLD: f64 = 0.5;

/// 计算两个字符串的相似度
///
/// 两边先规范化，再按字符计算 Levenshtein 距离。
/// 返回值范围 [0.0, 1.0]，两边都为空时为 1.0
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_similarity(&normalize(a), &normalize(b))
}

/// 对已规范化的文本计算相似度（跳过重复规范化）
pub fn normalized_similarity(a: &NormalizedText, b: &NormalizedText) -> f64 {
    let max_len = a.char_len().max(b.char_len()).max(1);
    let distance = levenshtein(a.as_str(), b.as_str());
    1.0 - (distance as f64 / max_len as f64)
}

/// 相似度评分器
///
/// 持有可配置的阈值
#[derive(Debug, Clone, Copy)]
pub struct Similarity {
    match_threshold: f64,
    live_highlight_threshold: f64,
}

impl Similarity {
    pub fn new(config: &MatchConfig) -> Self {
        Self {
            match_threshold: config.match_threshold,
            live_highlight_threshold: config.live_highlight_threshold,
        }
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    pub fn score(&self, spoken: &NormalizedText, expected: &NormalizedText) -> f64 {
        normalized_similarity(spoken, expected)
    }

    /// 是否判定为读对
    pub fn is_match(&self, spoken: &NormalizedText, expected: &NormalizedText) -> bool {
        self.score(spoken, expected) >= self.match_threshold
    }

    /// 实时高亮判定（严格大于阈值）
    pub fn is_live_match(&self, live: &NormalizedText, expected: &NormalizedText) -> bool {
        !live.is_empty() && self.score(live, expected) > self.live_highlight_threshold
    }
}

impl Default for Similarity {
    fn default() -> Self {
        Self::new(&MatchConfig::default())
    }
}

/// 使用默认阈值判定
pub fn is_match(a: &str, b: &str) -> bool {
    similarity(a, b) >= DEFAULT_MATCH_THRESHOLD
}
