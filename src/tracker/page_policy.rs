//! 翻页策略

use crate::config::{PageConfig, PageWrap};
use crate::error::RecitationError;

/// 读完当前页后的下一页（默认策略：停在最后一页，不回绕）
pub fn on_page_complete(current: u16, max_page: u16) -> u16 {
    max_page.min(current.saturating_add(1))
}

/// 翻页策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePolicy {
    max_page: u16,
    wrap: PageWrap,
}

impl PagePolicy {
    pub fn new(config: &PageConfig) -> Self {
        Self {
            max_page: config.max_page.max(1),
            wrap: config.wrap,
        }
    }

    pub fn max_page(&self) -> u16 {
        self.max_page
    }

    /// 读完 `current` 后应加载的页码
    ///
    /// 返回值等于 `current` 表示不需要翻页
    pub fn next_page(&self, current: u16) -> u16 {
        match self.wrap {
            PageWrap::Wrap if current >= self.max_page => 1,
            _ => on_page_complete(current, self.max_page),
        }
    }

    /// 上一页（手动翻页，不回绕）
    pub fn previous_page(&self, current: u16) -> u16 {
        self.clamp(current.saturating_sub(1))
    }

    /// 把页码限制在 1..=max_page
    pub fn clamp(&self, page: u16) -> u16 {
        page.clamp(1, self.max_page)
    }

    /// 校验页码
    pub fn validate(&self, page: u16) -> Result<u16, RecitationError> {
        if (1..=self.max_page).contains(&page) {
            Ok(page)
        } else {
            Err(RecitationError::InvalidPage {
                page,
                max: self.max_page,
            })
        }
    }
}

impl Default for PagePolicy {
    fn default() -> Self {
        Self::new(&PageConfig::default())
    }
}
