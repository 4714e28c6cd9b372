//! 经文页面：数据模型、词索引、文本提供者

mod provider;
mod types;
mod word_index;

pub use provider::{
    parse_alquran_cloud, AlQuranCloudAyah, AlQuranCloudPage, AlQuranCloudResponse,
    AlQuranCloudSurah, DirectoryTextProvider, StaticTextProvider, TextProvider,
};
pub use types::{ExpectedWord, PageData, VerseData, WordStatus};
pub use word_index::WordIndex;
