// 语音识别边界
//
// 识别器本身是外部协作者，这里只定义它产出的识别结果，
// 以及一个按脚本回放识别结果的实现（命令行回放、测试使用）

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RecitationError;

/// 识别结果的确定性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// 临时结果，可能被后续结果修正
    Interim,
    /// 最终结果
    Final,
}

/// 一次识别事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedToken {
    pub text: String,
    pub finality: Finality,
}

impl RecognizedToken {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finality: Finality::Interim,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finality: Finality::Final,
        }
    }

    pub fn is_final(&self) -> bool {
        self.finality == Finality::Final
    }
}

/// 识别器
///
/// `start` 返回的通道按识别顺序产出结果；识别器意外结束时通道关闭，
/// 重连由调用方负责
pub trait Recognizer: Send {
    fn start(&mut self) -> Result<mpsc::Receiver<RecognizedToken>, RecitationError>;
    fn stop(&mut self);
}

/// 识别脚本
///
/// 每行一个结果：`I:<文本>` 为临时结果，`F:<文本>` 或无前缀为最终结果，
/// 空行和 `#` 开头的行被忽略
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenScript {
    tokens: Vec<RecognizedToken>,
}

impl TokenScript {
    pub fn parse(content: &str) -> Self {
        let tokens = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| {
                if let Some(text) = line.strip_prefix("I:") {
                    RecognizedToken::interim(text.trim())
                } else if let Some(text) = line.strip_prefix("F:") {
                    RecognizedToken::final_result(text.trim())
                } else {
                    RecognizedToken::final_result(line)
                }
            })
            .collect();
        Self { tokens }
    }

    pub async fn load(path: &Path) -> Result<Self, RecitationError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RecitationError::io("读取识别脚本", e))?;
        Ok(Self::parse(&content))
    }

    pub fn tokens(&self) -> &[RecognizedToken] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// 按脚本回放的识别器
pub struct ScriptRecognizer {
    script: TokenScript,
    /// 相邻两个结果之间的间隔
    pace: Duration,
    task: Option<JoinHandle<()>>,
}

impl ScriptRecognizer {
    pub fn new(script: TokenScript) -> Self {
        Self {
            script,
            pace: Duration::ZERO,
            task: None,
        }
    }

    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }
}

impl Recognizer for ScriptRecognizer {
    fn start(&mut self) -> Result<mpsc::Receiver<RecognizedToken>, RecitationError> {
        self.stop();

        let (tx, rx) = mpsc::channel(32);
        let tokens = self.script.tokens.clone();
        let pace = self.pace;

        tracing::info!("开始回放识别脚本: {} 条结果", tokens.len());
        self.task = Some(tokio::spawn(async move {
            for token in tokens {
                if !pace.is_zero() {
                    tokio::time::sleep(pace).await;
                }
                if tx.send(token).await.is_err() {
                    tracing::debug!("识别结果接收端已关闭，停止回放");
                    break;
                }
            }
            tracing::debug!("识别脚本回放结束");
        }));

        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ScriptRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 检查识别能力
///
/// 启动时确定一次，之后不再逐次检查
pub fn require_recognizer<R: Recognizer>(recognizer: Option<R>) -> Result<R, RecitationError> {
    recognizer.ok_or_else(|| {
        tracing::error!("没有可用的语音识别器");
        RecitationError::RecognizerUnavailable
    })
}
