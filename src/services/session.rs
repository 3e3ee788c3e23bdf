//! # 对话会话服务
//!
//! 编排界面上的全部对话操作，是 Tauri command 与远程服务之间的业务层：
//! - **助手管理**：创建 / 删除助手
//! - **对话管理**：创建 / 删除对话，删除前级联取消未结束的 Run
//! - **消息发送**：发送消息后紧接着触发 Run
//! - **Run 生命周期**：创建 Run 后轮询状态，终态时停止并刷新消息
//!
//! ## 状态机
//! ```text
//! none ──create_run──▶ queued / in_progress ──poll──▶ completed | failed | cancelled | expired | incomplete
//!                             │
//!                             └──cancel_run──▶ 取消响应原样写入状态（不再轮询）
//! ```
//!
//! ## 轮询失败
//! 连续失败达到 `max_failures` 次后停止轮询，并在状态中写入 `poll_error`，
//! 前端据此显示"连接中断"；`resume_polling` 可手动恢复。单次成功会清零失败计数。
//!
//! ## 错误处理
//! 所有远程调用失败都会记录日志并发送错误提示，同时以 `Err(String)` 返回给调用方。
//! 本地镜像写入失败只记录警告，不影响界面状态。

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::models::assistant::{Assistant, AssistantConfig};
use crate::models::message::ThreadMessage;
use crate::models::run::Run;
use crate::models::settings::AppSettings;
use crate::models::state::PendingFlags;
use crate::models::thread::{DeletionStatus, Thread};
use crate::services::mirror::SessionMirror;
use crate::services::openai::{ApiError, AssistantApi};
use crate::services::poller::{PollTicket, RunPoller};
use crate::services::store::ChatStore;

/// 轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// 轮询间隔
    pub interval: Duration,
    /// 允许的连续失败次数（至少为 1）
    pub max_failures: u32,
}

impl PollOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.poll_interval_ms),
            max_failures: settings.max_poll_failures.max(1),
        }
    }
}

/// 进行中的操作，对应 `PendingFlags` 的各个字段
#[derive(Debug, Clone, Copy)]
enum Pending {
    CreatingThread,
    DeletingThread,
    Sending,
    Fetching,
    CreatingRun,
    Cancelling,
}

impl Pending {
    fn set(self, flags: &mut PendingFlags, on: bool) {
        let flag = match self {
            Pending::CreatingThread => &mut flags.creating_thread,
            Pending::DeletingThread => &mut flags.deleting_thread,
            Pending::Sending => &mut flags.sending,
            Pending::Fetching => &mut flags.fetching,
            Pending::CreatingRun => &mut flags.creating_run,
            Pending::Cancelling => &mut flags.cancelling,
        };
        *flag = on;
    }
}

struct SessionInner {
    api: Arc<dyn AssistantApi>,
    store: Arc<ChatStore>,
    mirror: SessionMirror,
    poller: RunPoller,
    options: RwLock<PollOptions>,
    assistant_config: RwLock<AssistantConfig>,
}

/// 对话会话
///
/// 克隆开销很小（内部为 `Arc`），轮询任务持有一份克隆。
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn AssistantApi>,
        store: Arc<ChatStore>,
        mirror: SessionMirror,
        options: PollOptions,
        assistant_config: AssistantConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                mirror,
                poller: RunPoller::new(),
                options: RwLock::new(options),
                assistant_config: RwLock::new(assistant_config),
            }),
        }
    }

    /// 共享状态容器
    pub fn store(&self) -> &Arc<ChatStore> {
        &self.inner.store
    }

    /// 远程服务客户端（代理端点复用）
    pub fn api(&self) -> Arc<dyn AssistantApi> {
        Arc::clone(&self.inner.api)
    }

    /// 当前助手配置
    pub fn assistant_config(&self) -> AssistantConfig {
        self.inner
            .assistant_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 应用新的设置（轮询参数和助手配置），对下一次启动的轮询生效
    pub fn apply_settings(&self, settings: &AppSettings) {
        *self
            .inner
            .options
            .write()
            .unwrap_or_else(PoisonError::into_inner) = PollOptions::from_settings(settings);
        *self
            .inner
            .assistant_config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings.assistant.clone();
    }

    fn poll_options(&self) -> PollOptions {
        *self
            .inner
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ======== 启动与退出 ========

    /// 从本地镜像恢复状态
    ///
    /// 恢复对话后刷新其消息；镜像中的 Run 尚未结束时继续轮询。
    pub async fn rehydrate(&self) {
        let restored = self.inner.mirror.load().await;
        log::info!(
            "恢复会话: assistant={:?}, thread={:?}, run={:?}",
            restored.assistant.as_ref().map(|a| &a.id),
            restored.thread.as_ref().map(|t| &t.id),
            restored.run.as_ref().map(|r| &r.id),
        );

        self.store().update(|s| {
            s.assistant = restored.assistant.clone();
            s.thread = restored.thread.clone();
            s.run_status = restored.run.as_ref().map(|r| r.status.clone());
            s.run = restored.run.clone();
        });

        if restored.thread.is_some() {
            let _ = self.fetch_messages().await;
        }

        if let (Some(thread), Some(run)) = (&restored.thread, &restored.run) {
            if !run.is_terminal() {
                self.start_polling(&thread.id, &run.id);
            }
        }
    }

    /// 应用退出：停止轮询任务
    pub fn shutdown(&self) {
        self.stop_polling();
    }

    // ======== 助手 ========

    /// 使用当前助手配置创建助手
    pub async fn create_assistant(&self) -> Result<Assistant, String> {
        let config = self.assistant_config();
        let assistant = self
            .inner
            .api
            .create_assistant(&config)
            .await
            .map_err(|e| self.fail("创建助手失败", e))?;

        self.store().update(|s| s.assistant = Some(assistant.clone()));
        persist(self.inner.mirror.save_assistant(&assistant).await);
        self.store().success("助手创建成功");
        Ok(assistant)
    }

    /// 删除当前助手
    pub async fn delete_assistant(&self) -> Result<DeletionStatus, String> {
        let assistant = self
            .store()
            .snapshot()
            .assistant
            .ok_or_else(|| "没有可删除的助手".to_string())?;

        let status = self
            .inner
            .api
            .delete_assistant(&assistant.id)
            .await
            .map_err(|e| self.fail("删除助手失败", e))?;

        self.store().update(|s| s.assistant = None);
        persist(self.inner.mirror.remove_assistant().await);
        self.store().success("助手删除成功");
        Ok(status)
    }

    // ======== 对话 ========

    /// 创建新对话并替换当前对话
    ///
    /// 旧 Run 属于旧对话，切换后不再跟踪。失败时保持原状态不变。
    pub async fn create_thread(&self) -> Result<Thread, String> {
        let thread = self
            .pending(Pending::CreatingThread, self.inner.api.create_thread())
            .await
            .map_err(|e| self.fail("创建对话失败", e))?;

        self.stop_polling();
        self.store().update(|s| {
            s.thread = Some(thread.clone());
            s.messages.clear();
            s.run = None;
            s.run_status = None;
            s.poll_error = None;
        });
        persist(self.inner.mirror.save_thread(&thread).await);
        persist(self.inner.mirror.remove_run().await);
        self.store().success("对话创建成功");

        let _ = self.fetch_messages().await;
        Ok(thread)
    }

    /// 删除当前对话
    ///
    /// 执行顺序：
    /// 1. 停止轮询
    /// 2. Run 未结束时先取消（失败只提示，不阻止删除）
    /// 3. 删除对话，成功后清空对话、Run、消息及其镜像
    ///
    /// 删除失败时对话仍然存在，Run 未结束则恢复轮询。
    pub async fn delete_thread(&self) -> Result<DeletionStatus, String> {
        let snapshot = self.store().snapshot();
        let thread = snapshot
            .thread
            .ok_or_else(|| "没有可删除的对话".to_string())?;

        let _pending = self.mark_pending(Pending::DeletingThread);
        self.delete_thread_inner(&thread, snapshot.run).await
    }

    async fn delete_thread_inner(
        &self,
        thread: &Thread,
        run: Option<Run>,
    ) -> Result<DeletionStatus, String> {
        self.stop_polling();

        if let Some(run) = run.filter(|r| !r.is_terminal()) {
            match self.inner.api.cancel_run(&thread.id, &run.id).await {
                Ok(cancelled) => {
                    log::info!("删除对话前已取消 Run {}", cancelled.id);
                    self.store().update(|s| {
                        s.run_status = Some(cancelled.status.clone());
                        s.run = Some(cancelled.clone());
                    });
                    persist(self.inner.mirror.save_run(&cancelled).await);
                }
                Err(e) => {
                    self.fail("取消 Run 失败", e);
                }
            }
        }

        let status = match self.inner.api.delete_thread(&thread.id).await {
            Ok(status) => status,
            Err(e) => {
                let message = self.fail("删除对话失败", e);
                let live = self
                    .store()
                    .snapshot()
                    .run
                    .filter(|r| r.thread_id == thread.id && !r.is_terminal());
                if let Some(run) = live {
                    self.start_polling(&thread.id, &run.id);
                }
                return Err(message);
            }
        };

        self.store().update(|s| {
            s.thread = None;
            s.messages.clear();
            s.run = None;
            s.run_status = None;
            s.poll_error = None;
        });
        persist(self.inner.mirror.remove_run().await);
        persist(self.inner.mirror.remove_thread().await);
        self.store().success("对话删除成功");
        Ok(status)
    }

    // ======== 消息 ========

    /// 刷新当前对话的消息列表（无对话时直接返回）
    pub async fn fetch_messages(&self) -> Result<(), String> {
        let Some(thread_id) = self.current_thread_id() else {
            return Ok(());
        };

        let messages = self
            .pending(Pending::Fetching, self.inner.api.list_messages(&thread_id))
            .await
            .map_err(|e| self.fail("获取消息失败", e))?;

        // 请求期间对话可能已被切换或删除
        self.store().update(|s| {
            if s.thread.as_ref().is_some_and(|t| t.id == thread_id) {
                s.messages = messages;
            }
        });
        Ok(())
    }

    /// 更新输入框草稿
    pub fn set_draft(&self, draft: String) {
        self.store().update(|s| s.draft = draft);
    }

    /// 发送消息到当前对话
    ///
    /// 成功后追加消息并清空草稿；失败时草稿保持不变。
    pub async fn send_message(&self, text: &str) -> Result<ThreadMessage, String> {
        if text.trim().is_empty() {
            return Err("消息内容不能为空".to_string());
        }
        let thread_id = self
            .current_thread_id()
            .ok_or_else(|| "请先创建对话".to_string())?;

        let message = self
            .pending(Pending::Sending, self.inner.api.create_message(&thread_id, text))
            .await
            .map_err(|e| self.fail("发送消息失败", e))?;

        self.store().update(|s| {
            if s.thread.as_ref().is_some_and(|t| t.id == thread_id)
                && !s.messages.iter().any(|m| m.id == message.id)
            {
                s.messages.push(message.clone());
            }
            s.draft.clear();
        });
        log::debug!("消息 {} 已发送: {}", message.id, message.text().unwrap_or_default());
        self.store().success("消息发送成功");
        Ok(message)
    }

    /// 发送消息并立即触发 Run
    ///
    /// 发送失败时不会创建 Run。
    pub async fn send_and_run(&self, text: &str) -> Result<Run, String> {
        self.send_message(text).await?;
        self.create_run().await
    }

    // ======== Run ========

    /// 为当前对话创建 Run 并开始轮询
    ///
    /// 创建前先停止已有的轮询，保证同一时刻只有一个轮询任务。
    pub async fn create_run(&self) -> Result<Run, String> {
        let snapshot = self.store().snapshot();
        let assistant = snapshot
            .assistant
            .ok_or_else(|| "请先创建助手".to_string())?;
        let thread = snapshot.thread.ok_or_else(|| "请先创建对话".to_string())?;

        self.stop_polling();
        let run = self
            .pending(
                Pending::CreatingRun,
                self.inner.api.create_run(&thread.id, &assistant.id),
            )
            .await
            .map_err(|e| self.fail("创建 Run 失败", e))?;

        self.store().update(|s| {
            s.run_status = Some(run.status.clone());
            s.run = Some(run.clone());
            s.poll_error = None;
        });
        persist(self.inner.mirror.save_run(&run).await);

        if run.is_terminal() {
            let _ = self.fetch_messages().await;
        } else {
            self.start_polling(&thread.id, &run.id);
        }
        Ok(run)
    }

    /// 取消当前 Run
    ///
    /// 先停止轮询，再把取消接口的响应原样写入状态。
    /// 取消请求失败且 Run 尚未结束时恢复轮询，继续跟踪其状态。
    pub async fn cancel_run(&self) -> Result<Run, String> {
        let snapshot = self.store().snapshot();
        let (thread, run) = match (snapshot.thread, snapshot.run) {
            (Some(thread), Some(run)) => (thread, run),
            _ => return Err("没有可取消的 Run".to_string()),
        };

        let was_polling = self.stop_polling();
        let result = self
            .pending(
                Pending::Cancelling,
                self.inner.api.cancel_run(&thread.id, &run.id),
            )
            .await;

        match result {
            Ok(cancelled) => {
                self.store().update(|s| {
                    s.run_status = Some(cancelled.status.clone());
                    s.run = Some(cancelled.clone());
                });
                persist(self.inner.mirror.save_run(&cancelled).await);
                self.store().success("Run 已取消");
                Ok(cancelled)
            }
            Err(e) => {
                let message = self.fail("取消 Run 失败", e);
                if was_polling && !run.is_terminal() {
                    self.start_polling(&thread.id, &run.id);
                }
                Err(message)
            }
        }
    }

    /// 手动恢复轮询（轮询因连续失败中断后使用）
    ///
    /// # 返回值
    /// 重新开始轮询时返回 `true`；Run 已结束时返回 `false`
    pub fn resume_polling(&self) -> Result<bool, String> {
        let snapshot = self.store().snapshot();
        let (thread, run) = match (snapshot.thread, snapshot.run) {
            (Some(thread), Some(run)) => (thread, run),
            _ => return Err("没有可轮询的 Run".to_string()),
        };
        if run.is_terminal() {
            return Ok(false);
        }
        if self.inner.poller.active_run().as_deref() == Some(run.id.as_str()) {
            return Ok(true);
        }
        self.start_polling(&thread.id, &run.id);
        Ok(true)
    }

    // ======== 轮询 ========

    fn start_polling(&self, thread_id: &str, run_id: &str) {
        let options = self.poll_options();
        self.store().update(|s| {
            s.polling = true;
            s.poll_error = None;
        });

        let session = self.clone();
        let thread_id = thread_id.to_string();
        let failures = Arc::new(AtomicU32::new(0));
        self.inner
            .poller
            .start(run_id, options.interval, move |ticket| {
                let session = session.clone();
                let thread_id = thread_id.clone();
                let failures = Arc::clone(&failures);
                async move {
                    session
                        .poll_once(&ticket, &thread_id, &failures, options.max_failures)
                        .await
                }
            });
    }

    /// 停止轮询
    ///
    /// # 返回值
    /// 存在活动轮询任务时返回 `true`
    fn stop_polling(&self) -> bool {
        let stopped = self.inner.poller.stop();
        self.store().update(|s| s.polling = false);
        stopped
    }

    /// 单次轮询：查询 Run 状态并更新界面状态
    async fn poll_once(
        &self,
        ticket: &PollTicket,
        thread_id: &str,
        failures: &AtomicU32,
        max_failures: u32,
    ) -> ControlFlow<()> {
        let result = self.inner.api.retrieve_run(thread_id, ticket.run_id()).await;
        if !ticket.is_current() {
            return ControlFlow::Break(());
        }

        match result {
            Ok(run) => {
                failures.store(0, Ordering::Relaxed);
                let terminal = run.is_terminal();
                log::debug!("Run {} 状态: {}", run.id, run.status.as_str());

                self.store().update(|s| {
                    s.run_status = Some(run.status.clone());
                    s.run = Some(run.clone());
                });

                if !terminal {
                    return ControlFlow::Continue(());
                }

                log::info!("Run {} 已结束: {}", run.id, run.status.as_str());
                persist(self.inner.mirror.save_run(&run).await);
                let _ = self.fetch_messages().await;
                // 消息刷新完成后才结束轮询状态，前端据此判断回复已就绪
                self.store().update(|s| s.polling = false);
                ControlFlow::Break(())
            }
            Err(e) => {
                let count = failures.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "轮询 Run {} 失败（{}/{}）: {}",
                    ticket.run_id(),
                    count,
                    max_failures,
                    e
                );
                if count < max_failures {
                    return ControlFlow::Continue(());
                }

                let message = format!("轮询 Run 状态失败，已停止轮询: {}", e.user_message());
                self.store().update(|s| {
                    s.polling = false;
                    s.poll_error = Some(message.clone());
                });
                self.store().error(message);
                ControlFlow::Break(())
            }
        }
    }

    // ======== 内部辅助 ========

    fn current_thread_id(&self) -> Option<String> {
        self.store().snapshot().thread.map(|t| t.id)
    }

    fn set_pending(&self, pending: Pending, on: bool) {
        self.store().update(|s| pending.set(&mut s.pending, on));
    }

    /// 标记操作进行中，返回的守卫离开作用域时清除标记
    fn mark_pending(&self, pending: Pending) -> PendingGuard<'_> {
        self.set_pending(pending, true);
        PendingGuard {
            session: self,
            pending,
        }
    }

    /// 在标记进行中的状态下等待一个远程调用
    ///
    /// 轮询任务被中止时 future 直接被丢弃，标记由守卫清除。
    async fn pending<T>(
        &self,
        pending: Pending,
        call: impl std::future::Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let _guard = self.mark_pending(pending);
        call.await
    }

    /// 记录错误并发送错误提示，返回提示文本
    fn fail(&self, context: &str, error: ApiError) -> String {
        let message = format!("{}: {}", context, error.user_message());
        self.store().error(message.clone());
        message
    }
}

struct PendingGuard<'a> {
    session: &'a ChatSession,
    pending: Pending,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.session.set_pending(self.pending, false);
    }
}

/// 镜像写入失败只记录警告
fn persist(result: Result<(), String>) {
    if let Err(e) = result {
        log::warn!("更新会话镜像失败: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run::RunStatus;
    use crate::models::state::NoticeLevel;
    use crate::services::testing::MockApi;

    const TICK: Duration = Duration::from_millis(10);

    struct Fixture {
        mock: Arc<MockApi>,
        session: ChatSession,
        dir: tempfile::TempDir,
    }

    fn fixture(max_failures: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockApi::new());
        let session = session_in(&mock, dir.path(), max_failures);
        Fixture {
            mock,
            session,
            dir,
        }
    }

    fn session_in(mock: &Arc<MockApi>, dir: &std::path::Path, max_failures: u32) -> ChatSession {
        let api: Arc<dyn AssistantApi> = mock.clone();
        ChatSession::new(
            api,
            Arc::new(ChatStore::new()),
            SessionMirror::new(dir),
            PollOptions {
                interval: TICK,
                max_failures,
            },
            AssistantConfig::default(),
        )
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..400 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn ready(f: &Fixture) {
        f.session.create_assistant().await.unwrap();
        f.session.create_thread().await.unwrap();
    }

    #[tokio::test]
    async fn hello_round_trip_ends_with_one_assistant_reply() {
        let f = fixture(3);
        ready(&f).await;
        f.mock.script([Ok(RunStatus::InProgress), Ok(RunStatus::Completed)]);

        f.session.set_draft("Hello".to_string());
        f.session.send_and_run("Hello").await.unwrap();
        wait_until(|| !f.session.store().snapshot().polling).await;

        let state = f.session.store().snapshot();
        assert_eq!(state.run_status, Some(RunStatus::Completed));
        assert_eq!(state.draft, "");
        let texts: Vec<(_, _)> = state
            .messages
            .iter()
            .map(|m| (m.role, m.text().unwrap_or_default().to_string()))
            .collect();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], (crate::models::message::MessageRole::User, "Hello".to_string()));
        assert_eq!(texts[1].0, crate::models::message::MessageRole::Assistant);

        // 终态后定时器不再触发
        let retrieved = f.mock.count("retrieve_run");
        assert_eq!(retrieved, 2);
        tokio::time::sleep(TICK * 6).await;
        assert_eq!(f.mock.count("retrieve_run"), retrieved);
    }

    #[tokio::test]
    async fn non_terminal_status_keeps_polling_until_cancel() {
        let f = fixture(3);
        ready(&f).await;
        f.mock.script([Ok(RunStatus::Queued), Ok(RunStatus::InProgress)]);

        f.session.create_run().await.unwrap();
        wait_until(|| f.mock.count("retrieve_run") >= 5).await;
        assert!(f.session.store().snapshot().polling);

        let cancelled = f.session.cancel_run().await.unwrap();
        assert_eq!(cancelled.status, RunStatus::Cancelling);
        let retrieved = f.mock.count("retrieve_run");
        tokio::time::sleep(TICK * 6).await;
        assert_eq!(f.mock.count("retrieve_run"), retrieved);
        assert!(!f.session.store().snapshot().polling);
    }

    #[tokio::test]
    async fn deleting_thread_cancels_active_run_first() {
        let f = fixture(3);
        ready(&f).await;
        let run = f.session.create_run().await.unwrap();
        let thread_id = run.thread_id.clone();

        f.session.delete_thread().await.unwrap();

        let calls = f.mock.calls();
        let cancel = calls
            .iter()
            .position(|c| c == &format!("cancel_run:{}:{}", thread_id, run.id))
            .unwrap();
        let delete = calls
            .iter()
            .position(|c| c == &format!("delete_thread:{}", thread_id))
            .unwrap();
        assert!(cancel < delete);

        let state = f.session.store().snapshot();
        assert!(state.thread.is_none() && state.run.is_none() && state.messages.is_empty());
        assert!(!state.polling);

        let restored = SessionMirror::new(f.dir.path()).load().await;
        assert!(restored.thread.is_none() && restored.run.is_none());
    }

    #[tokio::test]
    async fn cancel_failure_does_not_block_thread_deletion() {
        let f = fixture(3);
        ready(&f).await;
        f.session.create_run().await.unwrap();
        f.mock.fail("cancel_run");
        let mut notices = f.session.store().subscribe_notices();

        f.session.delete_thread().await.unwrap();

        assert_eq!(f.mock.count("delete_thread"), 1);
        let first = notices.recv().await.unwrap();
        assert_eq!(first.level, NoticeLevel::Error);
        assert!(f.session.store().snapshot().thread.is_none());
    }

    #[tokio::test]
    async fn failed_delete_keeps_polling_the_live_run() {
        let f = fixture(3);
        ready(&f).await;
        f.session.create_run().await.unwrap();
        f.mock.fail("cancel_run");
        f.mock.fail("delete_thread");

        assert!(f.session.delete_thread().await.is_err());

        let state = f.session.store().snapshot();
        assert!(state.thread.is_some());
        assert!(state.polling);
        assert_eq!(state.poll_error, None);
        assert!(!state.pending.deleting_thread);
        let retrieved = f.mock.count("retrieve_run");
        wait_until(|| f.mock.count("retrieve_run") > retrieved).await;
    }

    #[tokio::test]
    async fn cancel_before_failed_delete_is_mirrored() {
        let f = fixture(3);
        ready(&f).await;
        f.session.create_run().await.unwrap();
        f.mock.fail("delete_thread");

        assert!(f.session.delete_thread().await.is_err());

        let restored = SessionMirror::new(f.dir.path()).load().await;
        assert_eq!(restored.run.unwrap().status, RunStatus::Cancelling);
        // cancelling 尚未结束，继续跟踪直到终态
        assert!(f.session.store().snapshot().polling);
        f.session.cancel_run().await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_call_clears_its_pending_flag() {
        let f = fixture(3);
        let call = f.session.pending(
            Pending::Fetching,
            std::future::pending::<Result<(), ApiError>>(),
        );

        assert!(tokio::time::timeout(TICK, call).await.is_err());
        assert!(!f.session.store().snapshot().pending.fetching);
    }

    #[tokio::test]
    async fn every_terminal_status_stops_polling() {
        let terminal = [
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Expired,
            RunStatus::Incomplete,
        ];
        for status in terminal {
            let f = fixture(3);
            ready(&f).await;
            f.mock.script([Ok(status.clone())]);

            f.session.create_run().await.unwrap();
            wait_until(|| !f.session.store().snapshot().polling).await;

            assert_eq!(f.session.store().snapshot().run_status, Some(status.clone()));
            assert_eq!(f.mock.count("retrieve_run"), 1, "{}", status.as_str());
            tokio::time::sleep(TICK * 6).await;
            assert_eq!(f.mock.count("retrieve_run"), 1, "{}", status.as_str());
        }
    }

    #[tokio::test]
    async fn terminal_run_is_not_cancelled_before_delete() {
        let f = fixture(3);
        ready(&f).await;
        f.mock.script([Ok(RunStatus::Completed)]);
        f.session.create_run().await.unwrap();
        wait_until(|| !f.session.store().snapshot().polling).await;

        f.session.delete_thread().await.unwrap();
        assert_eq!(f.mock.count("cancel_run"), 0);
    }

    #[tokio::test]
    async fn cancel_on_completed_run_reflects_response_verbatim() {
        let f = fixture(3);
        ready(&f).await;
        f.mock.script([Ok(RunStatus::Completed)]);
        f.session.create_run().await.unwrap();
        wait_until(|| !f.session.store().snapshot().polling).await;
        let retrieved = f.mock.count("retrieve_run");

        f.mock.cancel_returns(RunStatus::Completed);
        let response = f.session.cancel_run().await.unwrap();

        let state = f.session.store().snapshot();
        assert_eq!(state.run.as_ref(), Some(&response));
        assert_eq!(state.run_status, Some(RunStatus::Completed));
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(f.mock.count("retrieve_run"), retrieved);
        assert!(!f.session.store().snapshot().polling);
    }

    #[tokio::test]
    async fn repeated_poll_failures_surface_connection_loss() {
        let f = fixture(2);
        ready(&f).await;
        f.mock.script([Ok(RunStatus::InProgress), Err(()), Err(())]);
        f.session.create_run().await.unwrap();

        wait_until(|| f.session.store().snapshot().poll_error.is_some()).await;
        let state = f.session.store().snapshot();
        assert!(!state.polling);
        assert_eq!(state.run_status, Some(RunStatus::InProgress));
        let retrieved = f.mock.count("retrieve_run");
        tokio::time::sleep(TICK * 5).await;
        assert_eq!(f.mock.count("retrieve_run"), retrieved);

        f.mock.script([Ok(RunStatus::Completed)]);
        assert!(f.session.resume_polling().unwrap());
        wait_until(|| f.session.store().snapshot().run_status == Some(RunStatus::Completed)).await;
        assert!(f.session.store().snapshot().poll_error.is_none());
    }

    #[tokio::test]
    async fn single_failure_is_tolerated() {
        let f = fixture(3);
        ready(&f).await;
        f.mock.script([Err(()), Ok(RunStatus::Completed)]);
        f.session.create_run().await.unwrap();

        wait_until(|| f.session.store().snapshot().run_status == Some(RunStatus::Completed)).await;
        assert!(f.session.store().snapshot().poll_error.is_none());
    }

    #[tokio::test]
    async fn new_run_replaces_previous_poll() {
        let f = fixture(3);
        ready(&f).await;
        let polls_of = |run: &Run| format!("retrieve_run:{}:{}", run.thread_id, run.id);
        let first = f.session.create_run().await.unwrap();
        wait_until(|| f.mock.count(&polls_of(&first)) > 0).await;

        let second = f.session.create_run().await.unwrap();
        let first_polls = f.mock.count(&polls_of(&first));
        wait_until(|| f.mock.count(&polls_of(&second)) >= 3).await;

        assert_eq!(f.mock.count(&polls_of(&first)), first_polls);
        f.session.shutdown();
    }

    #[tokio::test]
    async fn failed_thread_creation_keeps_previous_state() {
        let f = fixture(3);
        ready(&f).await;
        let before = f.session.store().snapshot();
        f.mock.fail("create_thread");

        assert!(f.session.create_thread().await.is_err());
        let after = f.session.store().snapshot();
        assert_eq!(after.thread, before.thread);
        assert!(!after.pending.creating_thread);
    }

    #[tokio::test]
    async fn failed_send_keeps_draft_and_skips_run() {
        let f = fixture(3);
        ready(&f).await;
        f.session.set_draft("keep me".to_string());
        f.mock.fail("create_message");

        assert!(f.session.send_and_run("keep me").await.is_err());
        let state = f.session.store().snapshot();
        assert_eq!(state.draft, "keep me");
        assert!(!state.pending.sending);
        assert_eq!(f.mock.count("create_run"), 0);

        f.mock.recover("create_message");
        f.session.send_and_run("keep me").await.unwrap();
        assert_eq!(f.session.store().snapshot().draft, "");
        f.session.shutdown();
    }

    #[tokio::test]
    async fn empty_message_is_rejected_locally() {
        let f = fixture(3);
        ready(&f).await;
        assert!(f.session.send_message("   ").await.is_err());
        assert_eq!(f.mock.count("create_message"), 0);
    }

    #[tokio::test]
    async fn rehydrate_restores_state_and_resumes_polling() {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockApi::new());

        let first = session_in(&mock, dir.path(), 3);
        first.create_assistant().await.unwrap();
        first.create_thread().await.unwrap();
        first.send_message("Hello").await.unwrap();
        let run = first.create_run().await.unwrap();
        first.shutdown();

        mock.script([Ok(RunStatus::Completed)]);
        let second = session_in(&mock, dir.path(), 3);
        second.rehydrate().await;

        let state = second.store().snapshot();
        assert_eq!(state.run.as_ref().map(|r| r.id.clone()), Some(run.id));
        assert!(state.assistant.is_some());
        assert_eq!(state.messages.len(), 1);

        wait_until(|| second.store().snapshot().run_status == Some(RunStatus::Completed)).await;
        wait_until(|| second.store().snapshot().messages.len() == 2).await;
    }
}
