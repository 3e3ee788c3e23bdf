//! # Thread 数据模型
//!
//! 对话上下文：消息和 Run 都挂在某个 Thread 下。界面同一时刻最多只有一个活动 Thread。

use serde::{Deserialize, Serialize};

/// 对话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    /// 远程 Thread ID（`thread_...`）
    pub id: String,

    /// 创建时间（Unix 秒）
    #[serde(default)]
    pub created_at: i64,

    /// 其余远程字段（metadata、tool_resources 等）原样保留
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// 删除操作的远程响应：`{ id, object, deleted }`
///
/// Thread 和 Assistant 的删除接口返回相同结构。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionStatus {
    pub id: String,
    #[serde(default)]
    pub object: String,
    pub deleted: bool,
}
