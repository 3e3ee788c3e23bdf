//! # 对话界面 Tauri Commands
//!
//! 界面上每个按钮对应一个 command，全部委托给 `ChatSession`。
//! 状态变化通过 `chat://state` 事件推送，command 的返回值只用于
//! 前端需要立即拿到结果的场景（如禁用按钮、滚动到新消息）。

use tauri::State;

use crate::models::assistant::Assistant;
use crate::models::message::ThreadMessage;
use crate::models::run::Run;
use crate::models::state::ChatState;
use crate::models::thread::{DeletionStatus, Thread};
use crate::services::app_state::AppState;

/// 当前状态快照（前端首次渲染时调用）
#[tauri::command]
pub async fn get_chat_state(state: State<'_, AppState>) -> Result<ChatState, String> {
    Ok(state.session.store().snapshot())
}

#[tauri::command]
pub async fn create_assistant(state: State<'_, AppState>) -> Result<Assistant, String> {
    state.session.create_assistant().await
}

#[tauri::command]
pub async fn delete_assistant(state: State<'_, AppState>) -> Result<DeletionStatus, String> {
    state.session.delete_assistant().await
}

#[tauri::command]
pub async fn create_thread(state: State<'_, AppState>) -> Result<Thread, String> {
    state.session.create_thread().await
}

/// 删除当前对话（Run 未结束时先取消）
#[tauri::command]
pub async fn delete_thread(state: State<'_, AppState>) -> Result<DeletionStatus, String> {
    state.session.delete_thread().await
}

#[tauri::command]
pub async fn fetch_messages(state: State<'_, AppState>) -> Result<(), String> {
    state.session.fetch_messages().await
}

/// 同步输入框内容，发送失败后草稿得以保留
#[tauri::command]
pub async fn set_draft(state: State<'_, AppState>, draft: String) -> Result<(), String> {
    state.session.set_draft(draft);
    Ok(())
}

#[tauri::command]
pub async fn send_message(
    state: State<'_, AppState>,
    text: String,
) -> Result<ThreadMessage, String> {
    state.session.send_message(&text).await
}

/// 发送消息并触发 Run（界面"发送"按钮）
#[tauri::command]
pub async fn send_and_run(state: State<'_, AppState>, text: String) -> Result<Run, String> {
    state.session.send_and_run(&text).await
}

#[tauri::command]
pub async fn create_run(state: State<'_, AppState>) -> Result<Run, String> {
    state.session.create_run().await
}

#[tauri::command]
pub async fn cancel_run(state: State<'_, AppState>) -> Result<Run, String> {
    state.session.cancel_run().await
}

/// 轮询因连接中断停止后手动恢复
///
/// # 返回值
/// 重新开始轮询时返回 `true`；Run 已结束时返回 `false`
#[tauri::command]
pub async fn resume_polling(state: State<'_, AppState>) -> Result<bool, String> {
    state.session.resume_polling()
}
