//! # 界面状态数据模型
//!
//! `ChatState` 是推送给前端的完整状态快照，前端只负责渲染，不自行维护副本。
//! `Notice` 是一次性的提示消息（对应前端的 toast）。

use serde::{Deserialize, Serialize};

use crate::models::assistant::Assistant;
use crate::models::message::ThreadMessage;
use crate::models::run::{Run, RunStatus};
use crate::models::thread::Thread;

/// 对话界面状态快照
///
/// 对应前端 TypeScript 接口：
/// ```typescript
/// interface ChatState {
///   assistant: Assistant | null;
///   thread: Thread | null;
///   messages: ThreadMessage[];
///   run: Run | null;
///   runStatus: RunStatus | null;
///   draft: string;
///   polling: boolean;
///   pollError: string | null;
///   pending: PendingFlags;
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    /// 当前助手
    pub assistant: Option<Assistant>,

    /// 当前对话（同一时刻至多一个）
    pub thread: Option<Thread>,

    /// 当前对话的消息，按创建时间升序
    pub messages: Vec<ThreadMessage>,

    /// 当前跟踪的 Run
    pub run: Option<Run>,

    /// 最近一次获得的 Run 状态
    pub run_status: Option<RunStatus>,

    /// 输入框草稿：发送成功后清空，失败时保留
    pub draft: String,

    /// 是否有活动的轮询任务
    pub polling: bool,

    /// 轮询中断原因；为 `Some` 时前端显示"连接中断"并提供重试入口
    pub poll_error: Option<String>,

    /// 进行中的操作标记，用于按钮的 loading / disabled 状态
    pub pending: PendingFlags,
}

/// 进行中的操作标记
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFlags {
    pub creating_thread: bool,
    pub deleting_thread: bool,
    pub sending: bool,
    pub fetching: bool,
    pub creating_run: bool,
    pub cancelling: bool,
}

/// 提示级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// 一次性提示消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}
