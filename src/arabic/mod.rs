//! 阿拉伯文文本层
//!
//! ## 处理流程
//! 1. 规范化：去符号、折叠字母变体、空白折叠
//! 2. 相似度：规范形式上的编辑距离

mod normalizer;
mod similarity;

pub use normalizer::{normalize, split_words, NormalizedText};
pub use similarity::{
    is_match, normalized_similarity, similarity, Similarity, DEFAULT_LIVE_HIGHLIGHT_THRESHOLD,
    DEFAULT_MATCH_THRESHOLD,
};
