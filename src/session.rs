// 跟读会话
//
// 会话任务独占状态机。开始/停止、识别结果、翻页请求、页面加载结果都经过同一个
// 命令队列，按到达顺序处理，所以换页对识别结果的处理是原子的。
// 页面获取在独立任务中进行，完成后把结果投递回队列；过期的结果直接丢弃。
// 每处理完一条命令就通过 watch 通道发布一份完整快照。

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::RecitationError;
use crate::feedback::FeedbackDispatcher;
use crate::quran::{PageData, TextProvider};
use crate::recognizer::{RecognizedToken, Recognizer};
use crate::tracker::{
    IgnoreReason, PagePolicy, RecitationTracker, RenderSnapshot, TokenOutcome, TrackerState,
};

const COMMAND_QUEUE_SIZE: usize = 100;

enum SessionCommand {
    Start,
    Stop,
    Token(RecognizedToken),
    SelectPage(u16),
    NextPage,
    PreviousPage,
    PageLoaded {
        generation: u64,
        page: u16,
        data: PageData,
    },
    PageFetchFailed {
        generation: u64,
        page: u16,
        error: RecitationError,
    },
    Flush(oneshot::Sender<RenderSnapshot>),
    FinishedPages(oneshot::Sender<Vec<RenderSnapshot>>),
    Close,
}

/// 跟读会话句柄
pub struct RecitationSession {
    id: Uuid,
    sender: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<RenderSnapshot>,
    task: JoinHandle<()>,
}

impl RecitationSession {
    /// 启动会话任务，并开始加载配置中的起始页
    pub fn spawn<P: TextProvider>(
        provider: P,
        config: &AppConfig,
        feedback: FeedbackDispatcher,
    ) -> Self {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (snapshot_tx, snapshot_rx) = watch::channel(RenderSnapshot::default());

        let policy = PagePolicy::new(&config.pages);
        let mut actor = SessionActor {
            id,
            provider: Arc::new(provider),
            tracker: RecitationTracker::new(&config.matching),
            policy,
            feedback,
            sender: sender.downgrade(),
            generation: 0,
            loading_page: None,
            auto_advance: false,
            last_error: None,
            finished_pages: Vec::new(),
            snapshots: snapshot_tx,
        };

        tracing::info!(
            "创建跟读会话 {}: 起始页 {}, 共 {} 页, 反馈 {}",
            id,
            config.pages.start_page,
            policy.max_page(),
            if actor.feedback.is_available() { "可用" } else { "不可用" }
        );
        actor.request_page(policy.clamp(config.pages.start_page));
        actor.publish();

        let task = tokio::spawn(actor.run(receiver));

        Self {
            id,
            sender,
            snapshots: snapshot_rx,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, command: SessionCommand) -> Result<(), RecitationError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RecitationError::SessionClosed)
    }

    pub async fn start(&self) -> Result<(), RecitationError> {
        self.send(SessionCommand::Start).await
    }

    pub async fn stop(&self) -> Result<(), RecitationError> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn submit_token(&self, token: RecognizedToken) -> Result<(), RecitationError> {
        self.send(SessionCommand::Token(token)).await
    }

    /// 跳到指定页（超出范围时取最近的有效页）
    pub async fn select_page(&self, page: u16) -> Result<(), RecitationError> {
        self.send(SessionCommand::SelectPage(page)).await
    }

    pub async fn next_page(&self) -> Result<(), RecitationError> {
        self.send(SessionCommand::NextPage).await
    }

    pub async fn previous_page(&self) -> Result<(), RecitationError> {
        self.send(SessionCommand::PreviousPage).await
    }

    /// 启动识别器并把识别结果转发进会话
    ///
    /// 返回的任务在识别结果通道关闭后结束
    pub async fn listen<R: Recognizer>(
        &self,
        recognizer: &mut R,
    ) -> Result<JoinHandle<()>, RecitationError> {
        let mut tokens = recognizer.start()?;
        self.start().await?;

        let sender = self.sender.clone();
        Ok(tokio::spawn(async move {
            while let Some(token) = tokens.recv().await {
                if sender.send(SessionCommand::Token(token)).await.is_err() {
                    tracing::warn!("会话已关闭，停止转发识别结果");
                    break;
                }
            }
            tracing::debug!("识别结果通道已关闭");
        }))
    }

    /// 等待此前提交的命令全部处理完，返回此时的快照
    pub async fn flush(&self) -> Result<RenderSnapshot, RecitationError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Flush(tx)).await?;
        rx.await.map_err(|_| RecitationError::SessionClosed)
    }

    /// 最新快照
    pub fn snapshot(&self) -> RenderSnapshot {
        self.snapshots.borrow().clone()
    }

    /// 已离开的各页在换页前的最后快照（按离开顺序）
    pub async fn finished_pages(&self) -> Result<Vec<RenderSnapshot>, RecitationError> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::FinishedPages(tx)).await?;
        rx.await.map_err(|_| RecitationError::SessionClosed)
    }

    /// 等待满足条件的快照
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&RenderSnapshot) -> bool,
    ) -> Result<RenderSnapshot, RecitationError> {
        let mut receiver = self.snapshots.clone();
        let snapshot = receiver
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| RecitationError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    /// 关闭会话并等待会话任务结束
    pub async fn close(self) {
        let _ = self.sender.send(SessionCommand::Close).await;
        if let Err(e) = self.task.await {
            tracing::error!("跟读会话 {} 异常结束: {}", self.id, e);
        }
    }
}

struct SessionActor<P> {
    id: Uuid,
    provider: Arc<P>,
    tracker: RecitationTracker,
    policy: PagePolicy,
    feedback: FeedbackDispatcher,
    /// 弱引用，句柄全部释放后队列才能关闭
    sender: mpsc::WeakSender<SessionCommand>,
    /// 每次请求新页面时递增，用于识别过期的加载结果
    generation: u64,
    loading_page: Option<u16>,
    /// 当前加载请求是否由读完一页自动发起
    auto_advance: bool,
    last_error: Option<String>,
    finished_pages: Vec<RenderSnapshot>,
    snapshots: watch::Sender<RenderSnapshot>,
}

impl<P: TextProvider> SessionActor<P> {
    async fn run(mut self, mut receiver: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                SessionCommand::Close => break,
                SessionCommand::Flush(reply) => {
                    let _ = reply.send(self.snapshot());
                    continue;
                }
                SessionCommand::FinishedPages(reply) => {
                    let _ = reply.send(self.finished_pages.clone());
                    continue;
                }
                command => self.handle(command),
            }
            self.publish();
        }
        tracing::info!("跟读会话 {} 已结束", self.id);
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => {
                self.tracker.start();
                self.advance_if_complete();
            }
            SessionCommand::Stop => self.tracker.stop(),
            SessionCommand::Token(token) => self.on_token(&token),
            SessionCommand::SelectPage(page) => {
                let target = self.policy.clamp(page);
                if target != page {
                    tracing::warn!("页码 {} 超出范围，改为第 {} 页", page, target);
                }
                self.navigate(target);
            }
            SessionCommand::NextPage => {
                if let Some(current) = self.current_target() {
                    self.navigate(self.policy.clamp(current.saturating_add(1)));
                }
            }
            SessionCommand::PreviousPage => {
                if let Some(current) = self.current_target() {
                    self.navigate(self.policy.previous_page(current));
                }
            }
            SessionCommand::PageLoaded {
                generation,
                page,
                mut data,
            } => {
                if generation != self.generation {
                    tracing::warn!("丢弃过期的页面加载结果: 第 {} 页", page);
                    return;
                }
                if data.page_number != page {
                    tracing::warn!("请求第 {} 页，收到第 {} 页", page, data.page_number);
                    data.page_number = page;
                }
                self.loading_page = None;
                self.auto_advance = false;
                self.last_error = None;
                if self.tracker.page_number().is_some() {
                    self.finished_pages.push(self.snapshot());
                }
                self.tracker.on_page_replaced(data);
                self.advance_if_complete();
            }
            SessionCommand::PageFetchFailed {
                generation,
                page,
                error,
            } => {
                if generation != self.generation {
                    tracing::warn!("丢弃过期的页面加载失败: 第 {} 页", page);
                    return;
                }
                tracing::warn!("{}，保留当前页 {:?}", error, self.tracker.page_number());
                let message = match self.tracker.page_number() {
                    Some(current) if self.auto_advance => {
                        format!("{}，自动翻页中断，停留在第 {} 页", error, current)
                    }
                    _ => error.to_string(),
                };
                self.loading_page = None;
                self.auto_advance = false;
                if error.is_user_visible() {
                    self.last_error = Some(message);
                }
            }
            SessionCommand::Flush(_) | SessionCommand::FinishedPages(_) | SessionCommand::Close => {}
        }
    }

    fn on_token(&mut self, token: &RecognizedToken) {
        match self.tracker.on_token(token) {
            TokenOutcome::Rejected { .. } => self.feedback.on_mismatch(),
            TokenOutcome::Accepted {
                page_complete: true,
                ..
            } => self.advance_if_complete(),
            TokenOutcome::Ignored(IgnoreReason::EmptyRecognition) => {
                tracing::debug!("{}: {:?}", RecitationError::EmptyRecognition, token.text);
            }
            _ => {}
        }
    }

    /// 手动翻页的基准页：正在加载的页优先
    fn current_target(&self) -> Option<u16> {
        self.loading_page.or(self.tracker.page_number())
    }

    fn navigate(&mut self, target: u16) {
        if self.current_target() == Some(target) {
            tracing::debug!("已在第 {} 页", target);
            return;
        }
        self.request_page(target);
    }

    /// 读完当前页时按翻页策略加载下一页
    fn advance_if_complete(&mut self) {
        if self.tracker.state() != TrackerState::PageComplete || self.loading_page.is_some() {
            return;
        }
        let Some(current) = self.tracker.page_number() else {
            return;
        };

        let next = self.policy.next_page(current);
        if next == current {
            tracing::info!("第 {} 页已读完，已是最后一页", current);
            return;
        }
        tracing::info!("第 {} 页已读完，翻到第 {} 页", current, next);
        self.request_page(next);
        self.auto_advance = true;
    }

    fn request_page(&mut self, page: u16) {
        let Some(sender) = self.sender.upgrade() else {
            return;
        };

        self.generation += 1;
        self.loading_page = Some(page);
        self.auto_advance = false;
        let generation = self.generation;
        let provider = Arc::clone(&self.provider);

        tracing::debug!("请求第 {} 页 (generation={})", page, generation);
        tokio::spawn(async move {
            let command = match provider.fetch_page(page).await {
                Ok(data) => SessionCommand::PageLoaded {
                    generation,
                    page,
                    data,
                },
                Err(error) => SessionCommand::PageFetchFailed {
                    generation,
                    page,
                    error,
                },
            };
            let _ = sender.send(command).await;
        });
    }

    fn snapshot(&self) -> RenderSnapshot {
        let mut snapshot = self.tracker.snapshot();
        snapshot.last_error = self.last_error.clone();
        snapshot.loading_page = self.loading_page;
        snapshot
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PageConfig, PageWrap};
    use crate::feedback::tests::RecordingSink;
    use crate::quran::{StaticTextProvider, VerseData, WordStatus};
    use crate::recognizer::{ScriptRecognizer, TokenScript};
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn page(number: u16, text: &str) -> PageData {
        PageData {
            page_number: number,
            verses: vec![VerseData::from_text(format!("{}:1", number), 1, text)],
        }
    }

    fn pages() -> StaticTextProvider {
        StaticTextProvider::new([
            page(1, "قُلْ هُوَ ٱللَّهُ أَحَدٌ"),
            page(2, "ٱللَّهُ ٱلصَّمَدُ"),
            page(3, "لَمْ يَلِدْ وَلَمْ يُولَدْ"),
        ])
    }

    fn config(start_page: u16, max_page: u16) -> AppConfig {
        AppConfig {
            pages: PageConfig {
                max_page,
                start_page,
                wrap: PageWrap::Clamp,
            },
            ..Default::default()
        }
    }

    async fn wait_until(
        session: &RecitationSession,
        predicate: impl FnMut(&RenderSnapshot) -> bool,
    ) -> RenderSnapshot {
        tokio::time::timeout(WAIT, session.wait_for(predicate))
            .await
            .expect("等待快照超时")
            .unwrap()
    }

    async fn started(provider: StaticTextProvider, config: &AppConfig) -> RecitationSession {
        let session = RecitationSession::spawn(provider, config, FeedbackDispatcher::disabled());
        wait_until(&session, |s| s.page_number.is_some()).await;
        session.start().await.unwrap();
        session
    }

    async fn recite(session: &RecitationSession, words: &[&str]) {
        for word in words {
            session
                .submit_token(RecognizedToken::final_result(*word))
                .await
                .unwrap();
        }
    }

    /// 按页码延迟返回的页面来源
    struct DelayedProvider {
        pages: StaticTextProvider,
        delays: HashMap<u16, Duration>,
    }

    impl TextProvider for DelayedProvider {
        fn fetch_page(
            &self,
            page: u16,
        ) -> impl Future<Output = Result<PageData, RecitationError>> + Send {
            let delay = self.delays.get(&page).copied().unwrap_or_default();
            let fetch = self.pages.fetch_page(page);
            async move {
                tokio::time::sleep(delay).await;
                fetch.await
            }
        }
    }

    #[tokio::test]
    async fn test_loads_start_page_idle() {
        let session = RecitationSession::spawn(pages(), &config(2, 3), FeedbackDispatcher::disabled());
        let snapshot = wait_until(&session, |s| s.page_number.is_some()).await;

        assert_eq!(snapshot.page_number, Some(2));
        assert_eq!(snapshot.state, TrackerState::Idle);
        assert_eq!(snapshot.word_count, 2);
        assert!(snapshot.loading_page.is_none());

        session.start().await.unwrap();
        assert_eq!(session.flush().await.unwrap().state, TrackerState::Listening);
        session.close().await;
    }

    #[tokio::test]
    async fn test_page_complete_advances_without_restart() {
        let session = started(pages(), &config(1, 3)).await;
        recite(&session, &["قل", "هو", "الله", "احد"]).await;

        let snapshot = wait_until(&session, |s| s.page_number == Some(2)).await;
        assert_eq!(snapshot.cursor, 0);
        assert!(snapshot.listening);
        assert_eq!(snapshot.state, TrackerState::Listening);
        assert!(snapshot.words.iter().all(|w| w.status == WordStatus::Pending));

        // 新页面上继续识别
        recite(&session, &["الله"]).await;
        assert_eq!(session.flush().await.unwrap().cursor, 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_clamped_at_last_page() {
        let session = started(pages(), &config(3, 3)).await;
        recite(&session, &["لم", "يلد", "ولم", "يولد"]).await;

        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.page_number, Some(3));
        assert_eq!(snapshot.state, TrackerState::PageComplete);
        assert!(snapshot.loading_page.is_none());
        assert_eq!(snapshot.progress_percent, 100.0);
        session.close().await;
    }

    #[tokio::test]
    async fn test_mismatch_feedback_once() {
        let sink = Arc::new(RecordingSink::default());
        let feedback = FeedbackDispatcher::new(Some(sink.clone()), 120);
        let session = RecitationSession::spawn(pages(), &config(1, 3), feedback);
        wait_until(&session, |s| s.page_number.is_some()).await;
        session.start().await.unwrap();

        session
            .submit_token(RecognizedToken::interim("شيء"))
            .await
            .unwrap();
        recite(&session, &["شيء"]).await;

        let snapshot = session.flush().await.unwrap();
        assert_eq!(sink.vibrations.load(Ordering::SeqCst), 1);
        assert_eq!(sink.cues.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.cursor, 0);
        assert_eq!(snapshot.words[0].status, WordStatus::Incorrect);
        assert_eq!(snapshot.mistakes.len(), 1);
        assert_eq!(snapshot.mistakes[0].heard, "شيء");
        session.close().await;
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_page() {
        let provider = StaticTextProvider::new([page(1, "قُلْ هُوَ ٱللَّهُ أَحَدٌ")]);
        let session = started(provider, &config(1, 3)).await;

        session.select_page(2).await.unwrap();
        let snapshot = wait_until(&session, |s| s.last_error.is_some()).await;
        assert_eq!(snapshot.page_number, Some(1));
        assert!(snapshot.loading_page.is_none());
        assert!(snapshot.last_error.unwrap().contains('2'));

        // 上一个有效页面仍可跟读
        recite(&session, &["قل"]).await;
        assert_eq!(session.flush().await.unwrap().cursor, 1);
        session.close().await;
    }

    #[tokio::test]
    async fn test_failed_auto_advance_reported() {
        let provider = StaticTextProvider::new([page(1, "قُلْ هُوَ")]);
        let session = started(provider, &config(1, 3)).await;
        recite(&session, &["قل", "هو"]).await;

        let snapshot = wait_until(&session, |s| s.last_error.is_some()).await;
        assert_eq!(snapshot.page_number, Some(1));
        assert_eq!(snapshot.state, TrackerState::PageComplete);
        assert!(snapshot.loading_page.is_none());
        assert!(snapshot.last_error.unwrap().contains("自动翻页中断"));

        // 手动翻页失败时不带自动翻页提示
        session.select_page(3).await.unwrap();
        let snapshot = wait_until(&session, |s| {
            s.loading_page.is_none() && s.last_error.as_deref().is_some_and(|e| e.contains('3'))
        })
        .await;
        assert!(!snapshot.last_error.unwrap().contains("自动翻页中断"));
        session.close().await;
    }

    #[tokio::test]
    async fn test_finished_pages_keep_last_word() {
        let session = started(pages(), &config(1, 3)).await;
        recite(&session, &["قل", "هو", "الله", "احد"]).await;
        wait_until(&session, |s| s.page_number == Some(2)).await;

        let finished = session.finished_pages().await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].page_number, Some(1));
        assert_eq!(finished[0].progress_percent, 100.0);
        assert!(finished[0].words.iter().all(|w| w.status == WordStatus::Correct));
        session.close().await;
    }

    #[tokio::test]
    async fn test_no_page_stays_idle() {
        let session = RecitationSession::spawn(
            StaticTextProvider::default(),
            &config(1, 3),
            FeedbackDispatcher::disabled(),
        );
        let snapshot = wait_until(&session, |s| s.last_error.is_some()).await;
        assert!(snapshot.page_number.is_none());

        session.start().await.unwrap();
        recite(&session, &["قل"]).await;
        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.state, TrackerState::Idle);
        assert_eq!(snapshot.progress_percent, 0.0);
        session.close().await;
    }

    #[tokio::test]
    async fn test_stale_fetch_discarded() {
        let provider = DelayedProvider {
            pages: pages(),
            delays: HashMap::from([(2, Duration::from_millis(150))]),
        };
        let session = RecitationSession::spawn(provider, &config(1, 3), FeedbackDispatcher::disabled());
        wait_until(&session, |s| s.page_number == Some(1)).await;

        session.select_page(2).await.unwrap();
        session.select_page(3).await.unwrap();
        wait_until(&session, |s| s.page_number == Some(3)).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.page_number, Some(3));
        assert!(snapshot.loading_page.is_none());
        session.close().await;
    }

    #[tokio::test]
    async fn test_stop_ignores_queued_tokens() {
        let session = started(pages(), &config(1, 3)).await;
        recite(&session, &["قل"]).await;
        session.stop().await.unwrap();
        recite(&session, &["هو"]).await;

        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.state, TrackerState::Idle);
        assert_eq!(snapshot.cursor, 1);

        session.start().await.unwrap();
        recite(&session, &["هو"]).await;
        assert_eq!(session.flush().await.unwrap().cursor, 2);
        session.close().await;
    }

    #[tokio::test]
    async fn test_manual_navigation() {
        let session = started(pages(), &config(1, 3)).await;
        recite(&session, &["قل"]).await;

        session.next_page().await.unwrap();
        let snapshot = wait_until(&session, |s| s.page_number == Some(2)).await;
        assert_eq!(snapshot.cursor, 0);
        assert!(snapshot.listening);

        session.previous_page().await.unwrap();
        wait_until(&session, |s| s.page_number == Some(1)).await;

        // 第一页之前没有页面
        session.previous_page().await.unwrap();
        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.page_number, Some(1));
        assert!(snapshot.loading_page.is_none());

        session.select_page(999).await.unwrap();
        wait_until(&session, |s| s.page_number == Some(3)).await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_empty_page_skipped() {
        let provider = StaticTextProvider::new([
            page(1, "قُلْ هُوَ"),
            page(2, "۞"),
            page(3, "لَمْ يَلِدْ"),
        ]);
        let session = started(provider, &config(1, 3)).await;
        recite(&session, &["قل", "هو"]).await;

        let snapshot = wait_until(&session, |s| s.page_number == Some(3)).await;
        assert_eq!(snapshot.word_count, 2);
        assert_eq!(snapshot.state, TrackerState::Listening);
        session.close().await;
    }

    #[tokio::test]
    async fn test_listen_forwards_recognizer() {
        let session = RecitationSession::spawn(pages(), &config(1, 3), FeedbackDispatcher::disabled());
        wait_until(&session, |s| s.page_number.is_some()).await;

        let mut recognizer = ScriptRecognizer::new(TokenScript::parse("I:قل\nF:قل\nI:هـ\nF:هو\n"));
        let forwarder = session.listen(&mut recognizer).await.unwrap();
        forwarder.await.unwrap();

        let snapshot = session.flush().await.unwrap();
        assert_eq!(snapshot.cursor, 2);
        assert!(snapshot.live_word.is_none());
        session.close().await;
    }

    #[tokio::test]
    async fn test_closed_session_rejects_commands() {
        let session = RecitationSession::spawn(pages(), &config(1, 3), FeedbackDispatcher::disabled());
        let _ = session.sender.send(SessionCommand::Close).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(matches!(
            session.start().await,
            Err(RecitationError::SessionClosed)
        ));
        assert!(session.flush().await.is_err());
    }
}
