//! # 共享界面状态容器
//!
//! 持有当前助手、对话、消息列表、Run 及其状态，是前端唯一的状态来源。
//!
//! ## 观察机制
//! - 状态使用 `tokio::sync::watch` 保存：写入即更新，观察者只关心最新快照，
//!   中间状态被合并不会造成问题
//! - 提示消息使用 `tokio::sync::broadcast`：每条提示都需要送达，不能合并
//!
//! ## 不变量
//! 消息列表在每次写入后都按创建时间升序排列，调用方无需关心接口返回顺序。

use tokio::sync::{broadcast, watch};

use crate::models::message;
use crate::models::state::{ChatState, Notice, NoticeLevel};

/// 提示广播通道容量
///
/// 观察者落后超过此数量时最旧的提示会被丢弃（提示本身是一次性的）。
const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// 界面状态容器
///
/// 在会话服务和事件转发任务之间通过 `Arc<ChatStore>` 共享。
pub struct ChatStore {
    state: watch::Sender<ChatState>,
    notices: broadcast::Sender<Notice>,
}

impl ChatStore {
    /// 创建空状态容器
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChatState::default());
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { state, notices }
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// 订阅提示消息
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// 原地修改状态并通知观察者
    ///
    /// 修改后统一重新排序消息，保证升序不变量。
    pub fn update<R: Default>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut result = None;
        self.state.send_modify(|state| {
            result = Some(f(state));
            message::sort_by_created_at(&mut state.messages);
        });
        // send_modify 总是同步调用闭包
        result.unwrap_or_default()
    }

    /// 发送提示消息（同时写入日志）
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Success => log::info!("{}", message),
            NoticeLevel::Error => log::error!("{}", message),
        }
        // 没有订阅者时发送失败是正常情况（前端尚未就绪）
        let _ = self.notices.send(Notice { level, message });
    }

    /// 成功提示
    pub fn success(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    /// 错误提示
    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}
