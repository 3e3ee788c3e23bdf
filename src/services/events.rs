//! # 前端事件转发
//!
//! 把 `ChatStore` 的状态快照和提示消息推送给前端：
//! - `chat://state` - 完整状态快照（每次变化后推送最新值）
//! - `chat://notice` - 一次性提示消息（成功 / 错误）
//!
//! 推送目标抽象为 `EventSink`，生产环境使用 Tauri 的 `Emitter`，测试中使用记录器。

use std::sync::Arc;

use tauri::{AppHandle, Emitter};
use tokio::sync::broadcast::error::RecvError;

use crate::models::state::{ChatState, Notice};
use crate::services::store::ChatStore;

/// 状态快照事件名
pub const STATE_EVENT: &str = "chat://state";

/// 提示消息事件名
pub const NOTICE_EVENT: &str = "chat://notice";

/// 事件推送目标
pub trait EventSink: Send + Sync + 'static {
    fn emit_state(&self, state: &ChatState);
    fn emit_notice(&self, notice: &Notice);
}

/// 通过 Tauri 事件系统推送到所有窗口
pub struct TauriEventSink {
    app: AppHandle,
}

impl TauriEventSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl EventSink for TauriEventSink {
    fn emit_state(&self, state: &ChatState) {
        if let Err(e) = self.app.emit(STATE_EVENT, state) {
            log::warn!("推送状态事件失败: {}", e);
        }
    }

    fn emit_notice(&self, notice: &Notice) {
        if let Err(e) = self.app.emit(NOTICE_EVENT, notice) {
            log::warn!("推送提示事件失败: {}", e);
        }
    }
}

/// 持续转发状态和提示，直到 `ChatStore` 被释放
///
/// 启动时先推送一次当前状态，保证前端拿到初始快照。
pub async fn forward(store: Arc<ChatStore>, sink: Arc<dyn EventSink>) {
    let mut state_rx = store.subscribe();
    let mut notice_rx = store.subscribe_notices();
    // 转发任务只持有接收端，发送端随 store 释放后两个通道都会关闭
    drop(store);

    sink.emit_state(&state_rx.borrow_and_update());

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                sink.emit_state(&state);
            }
            notice = notice_rx.recv() => match notice {
                Ok(notice) => sink.emit_notice(&notice),
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("前端提示积压，丢弃 {} 条", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    log::info!("事件转发任务结束");
}
