// 错误分类
//
// 只有"没有页面数据"会让状态机停在 Idle，其余错误都不会中断跟读流程：
// - RecognizerUnavailable: 宿主没有语音识别能力，提示用户，不重试
// - PageFetchFailed: 暂时性失败，保留上一个有效页面
// - EmptyRecognition: 规范化后为空的识别结果，静默忽略
// - FeedbackSinkUnavailable: 震动/提示音不可用，静默忽略

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecitationError {
    #[error("当前环境不支持语音识别")]
    RecognizerUnavailable,
    #[error("获取第 {page} 页失败: {reason}")]
    PageFetchFailed { page: u16, reason: String },
    #[error("识别结果为空")]
    EmptyRecognition,
    #[error("反馈设备不可用: {0}")]
    FeedbackSinkUnavailable(String),
    #[error("页码 {page} 超出范围 1..={max}")]
    InvalidPage { page: u16, max: u16 },
    #[error("I/O 错误（{context}）: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON 解析错误（{context}）: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("会话已关闭")]
    SessionClosed,
}

impl RecitationError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn page_fetch(page: u16, reason: impl std::fmt::Display) -> Self {
        Self::PageFetchFailed {
            page,
            reason: reason.to_string(),
        }
    }

    /// 是否应该展示给用户
    ///
    /// 空识别和反馈设备缺失属于静默错误
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            RecitationError::EmptyRecognition | RecitationError::FeedbackSinkUnavailable(_)
        )
    }
}
