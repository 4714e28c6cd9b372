// 读错反馈：震动 + 提示音
//
// 所有反馈都是尽力而为，失败只记日志，不影响跟读状态

use std::sync::Arc;
use std::time::Duration;

use rodio::source::SineWave;
use rodio::{OutputStream, Sink, Source};

use crate::config::FeedbackConfig;
use crate::error::RecitationError;

// 提示音频率与时长
const CUE_FREQUENCY_HZ: f32 = 880.0;
const CUE_DURATION_MS: u64 = 150;

/// 反馈设备
pub trait FeedbackSink: Send + Sync {
    /// 震动
    fn vibrate(&self, duration_ms: u64) -> Result<(), RecitationError>;
    /// 从头播放提示音（非阻塞）
    fn play_cue(&self) -> Result<(), RecitationError>;
}

/// 桌面提示音设备
///
/// 桌面端没有震动能力，`vibrate` 始终返回 `FeedbackSinkUnavailable`
pub struct CueSink {
    volume: f32,
}

impl CueSink {
    /// 探测默认音频输出设备
    ///
    /// 没有输出设备时返回 None
    pub fn probe(volume: f32) -> Option<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        if host.default_output_device().is_none() {
            tracing::warn!("没有找到默认音频输出设备，读错提示音不可用");
            return None;
        }
        Some(Self { volume })
    }
}

impl FeedbackSink for CueSink {
    fn vibrate(&self, _duration_ms: u64) -> Result<(), RecitationError> {
        Err(RecitationError::FeedbackSinkUnavailable(
            "桌面端不支持震动".to_string(),
        ))
    }

    fn play_cue(&self) -> Result<(), RecitationError> {
        let volume = self.volume;
        // 在新线程中播放，避免阻塞调用方
        std::thread::spawn(move || {
            if let Err(e) = play_cue_blocking(volume) {
                tracing::error!("播放提示音失败: {}", e);
            }
        });
        Ok(())
    }
}

/// 阻塞式播放提示音
fn play_cue_blocking(volume: f32) -> Result<(), Box<dyn std::error::Error>> {
    let (_stream, stream_handle) = OutputStream::try_default()?;
    let sink = Sink::try_new(&stream_handle)?;

    let source = SineWave::new(CUE_FREQUENCY_HZ)
        .take_duration(Duration::from_millis(CUE_DURATION_MS))
        .amplify(volume);

    sink.append(source);
    sink.sleep_until_end();

    Ok(())
}

/// 反馈分发器
///
/// 反馈设备在启动时确定一次（有或没有），之后不再逐次检查
#[derive(Clone)]
pub struct FeedbackDispatcher {
    sink: Option<Arc<dyn FeedbackSink>>,
    vibrate_ms: u64,
}

impl FeedbackDispatcher {
    pub fn new(sink: Option<Arc<dyn FeedbackSink>>, vibrate_ms: u64) -> Self {
        Self { sink, vibrate_ms }
    }

    /// 不产生任何反馈
    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    /// 按配置探测桌面设备
    pub fn from_config(config: &FeedbackConfig) -> Self {
        if !config.enabled {
            tracing::info!("读错反馈已关闭");
            return Self::disabled();
        }
        let sink = CueSink::probe(config.cue_volume as f32).map(|s| Arc::new(s) as Arc<dyn FeedbackSink>);
        Self::new(sink, config.vibrate_ms)
    }

    pub fn is_available(&self) -> bool {
        self.sink.is_some()
    }

    /// 读错时调用
    pub fn on_mismatch(&self) {
        let Some(sink) = &self.sink else {
            return;
        };

        if let Err(e) = sink.vibrate(self.vibrate_ms) {
            tracing::debug!("震动失败（忽略）: {}", e);
        }
        if let Err(e) = sink.play_cue() {
            tracing::debug!("提示音失败（忽略）: {}", e);
        }
    }
}

impl std::fmt::Debug for FeedbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackDispatcher")
            .field("available", &self.is_available())
            .field("vibrate_ms", &self.vibrate_ms)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数的反馈设备
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub vibrations: AtomicUsize,
        pub cues: AtomicUsize,
        pub last_duration_ms: AtomicUsize,
        pub fail: bool,
    }

    impl FeedbackSink for RecordingSink {
        fn vibrate(&self, duration_ms: u64) -> Result<(), RecitationError> {
            self.vibrations.fetch_add(1, Ordering::SeqCst);
            self.last_duration_ms
                .store(duration_ms as usize, Ordering::SeqCst);
            if self.fail {
                return Err(RecitationError::FeedbackSinkUnavailable("no motor".into()));
            }
            Ok(())
        }

        fn play_cue(&self) -> Result<(), RecitationError> {
            self.cues.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RecitationError::FeedbackSinkUnavailable("no speaker".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_mismatch_fires_both() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = FeedbackDispatcher::new(Some(sink.clone()), 120);
        dispatcher.on_mismatch();

        assert_eq!(sink.vibrations.load(Ordering::SeqCst), 1);
        assert_eq!(sink.cues.load(Ordering::SeqCst), 1);
        assert_eq!(sink.last_duration_ms.load(Ordering::SeqCst), 120);
    }

    #[test]
    fn test_failures_swallowed() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let dispatcher = FeedbackDispatcher::new(Some(sink.clone()), 120);
        dispatcher.on_mismatch();
        // 震动失败后仍然尝试提示音
        assert_eq!(sink.cues.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled() {
        let dispatcher = FeedbackDispatcher::from_config(&FeedbackConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!dispatcher.is_available());
        dispatcher.on_mismatch();
    }
}
