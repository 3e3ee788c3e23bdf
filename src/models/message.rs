//! # 消息数据模型
//!
//! 定义了对话消息（ThreadMessage）和内容块（MessageContent），
//! 对应远程服务 `thread.message` 对象及前端渲染所需的字段。
//!
//! 内容块采用 `serde_json::Value` 处理，远程服务新增内容块类型（图片、文件引用等）
//! 时不会导致反序列化失败。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息内容块
///
/// 文本块的结构为 `{ "type": "text", "text": { "value": "...", "annotations": [] } }`。
/// 其余类型原样保留，由前端决定是否渲染。
pub type MessageContent = Value;

/// 消息作者角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// 用户发送的消息
    User,
    /// 助手生成的回复
    Assistant,
}

/// 对话消息
///
/// 从本地客户端视角是只追加、不可变的记录。
/// 展示顺序以 `created_at` 升序为准，与接口返回顺序无关。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    /// 远程消息 ID（`msg_...`）
    pub id: String,

    /// 所属对话 ID
    #[serde(default)]
    pub thread_id: String,

    /// 作者角色
    pub role: MessageRole,

    /// 内容块列表
    #[serde(default)]
    pub content: Vec<MessageContent>,

    /// 创建时间（Unix 秒）
    #[serde(default)]
    pub created_at: i64,

    /// 生成该消息的 Run（仅助手消息有值）
    #[serde(default)]
    pub run_id: Option<String>,

    /// 其余远程字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ThreadMessage {
    /// 提取第一个文本内容块的文本
    ///
    /// 首个内容块不是文本时返回 `None`，与前端只渲染文本块的行为一致。
    pub fn text(&self) -> Option<&str> {
        let first = self.content.first()?;
        if first.get("type").and_then(Value::as_str) != Some("text") {
            return None;
        }
        first.get("text")?.get("value")?.as_str()
    }
}

/// 按创建时间升序排列消息
///
/// 使用稳定排序：同一秒内创建的消息保持接口返回的相对顺序。
pub fn sort_by_created_at(messages: &mut [ThreadMessage]) {
    messages.sort_by_key(|m| m.created_at);
}
