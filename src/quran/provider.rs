//! 经文文本提供者
//!
//! 把不同来源的数据格式统一为 [`PageData`]，核心逻辑不关心来源字段名

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::RecitationError;
use crate::quran::types::{PageData, VerseData};

/// 文本提供者
///
/// 失败（文件缺失、格式错误等）统一表现为 `PageFetchFailed`
pub trait TextProvider: Send + Sync + 'static {
    fn fetch_page(
        &self,
        page: u16,
    ) -> impl Future<Output = Result<PageData, RecitationError>> + Send;
}

// ============================================================================
// api.alquran.cloud 响应格式
// ============================================================================

/// `/v1/page/{n}/quran-uthman` 响应
#[derive(Debug, Deserialize)]
pub struct AlQuranCloudResponse {
    pub code: u16,
    #[serde(default)]
    pub status: String,
    /// 成功时为页面对象，失败时为错误描述字符串
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct AlQuranCloudPage {
    pub number: u16,
    #[serde(default)]
    pub ayahs: Vec<AlQuranCloudAyah>,
}

#[derive(Debug, Deserialize)]
pub struct AlQuranCloudAyah {
    pub number: u32,
    pub text: String,
    #[serde(rename = "numberInSurah")]
    pub number_in_surah: u16,
    pub surah: AlQuranCloudSurah,
}

#[derive(Debug, Deserialize)]
pub struct AlQuranCloudSurah {
    pub number: u16,
}

impl From<AlQuranCloudPage> for PageData {
    fn from(page: AlQuranCloudPage) -> Self {
        let verses = page
            .ayahs
            .into_iter()
            .map(|ayah| {
                let key = format!("{}:{}", ayah.surah.number, ayah.number_in_surah);
                VerseData::from_text(key, ayah.number_in_surah, &ayah.text)
            })
            .collect();

        PageData {
            page_number: page.number,
            verses,
        }
    }
}

/// 解析 api.alquran.cloud 的页面响应
pub fn parse_alquran_cloud(page: u16, body: &str) -> Result<PageData, RecitationError> {
    let response: AlQuranCloudResponse =
        serde_json::from_str(body).map_err(|e| RecitationError::page_fetch(page, e))?;

    if response.code != 200 {
        let detail = response
            .data
            .as_str()
            .map(str::to_string)
            .unwrap_or(response.status);
        return Err(RecitationError::page_fetch(
            page,
            format!("code={} {}", response.code, detail),
        ));
    }

    let data: AlQuranCloudPage =
        serde_json::from_value(response.data).map_err(|e| RecitationError::page_fetch(page, e))?;

    if data.number != page {
        tracing::warn!("请求第 {} 页，响应中的页码为 {}", page, data.number);
    }

    Ok(data.into())
}

// ============================================================================
// 本地目录
// ============================================================================

/// 从本地目录读取 `<root>/<page>.json`（api.alquran.cloud 响应格式）
#[derive(Debug, Clone)]
pub struct DirectoryTextProvider {
    root: PathBuf,
}

impl DirectoryTextProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn page_path(&self, page: u16) -> PathBuf {
        self.root.join(format!("{}.json", page))
    }
}

impl TextProvider for DirectoryTextProvider {
    fn fetch_page(
        &self,
        page: u16,
    ) -> impl Future<Output = Result<PageData, RecitationError>> + Send {
        let path = self.page_path(page);
        async move {
            tracing::debug!("读取页面文件: {:?}", path);
            let body = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| RecitationError::page_fetch(page, format!("{:?}: {}", path, e)))?;
            parse_alquran_cloud(page, &body)
        }
    }
}

// ============================================================================
// 内存
// ============================================================================

/// 内存中的页面集合
#[derive(Debug, Clone, Default)]
pub struct StaticTextProvider {
    pages: HashMap<u16, PageData>,
}

impl StaticTextProvider {
    pub fn new(pages: impl IntoIterator<Item = PageData>) -> Self {
        Self {
            pages: pages.into_iter().map(|p| (p.page_number, p)).collect(),
        }
    }
}

impl TextProvider for StaticTextProvider {
    fn fetch_page(
        &self,
        page: u16,
    ) -> impl Future<Output = Result<PageData, RecitationError>> + Send {
        let result = self
            .pages
            .get(&page)
            .cloned()
            .ok_or_else(|| RecitationError::page_fetch(page, "not found"));
        async move { result }
    }
}
