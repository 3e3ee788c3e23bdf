//! # Run 数据模型
//!
//! Run 是助手针对某个对话（Thread）的一次异步执行。创建后由远程服务推进状态，
//! 本地只负责轮询状态并在终态时停止。
//!
//! 状态枚举与远程服务返回的字符串一一对应（snake_case）。

use serde::{Deserialize, Serialize};

/// Run 状态
///
/// 远程服务可能在未来新增状态，未识别的值保存在 `Unknown` 中原样写回，
/// 并按非终态处理（继续轮询），避免因新增状态导致整条 Run 解析失败。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    /// 已排队，等待执行
    Queued,
    /// 执行中
    InProgress,
    /// 等待客户端提交工具调用结果
    RequiresAction,
    /// 取消请求已受理，正在取消
    Cancelling,
    /// 已取消
    Cancelled,
    /// 执行失败
    Failed,
    /// 执行完成
    Completed,
    /// 因 token 上限等原因提前结束
    Incomplete,
    /// 超时过期
    Expired,
    /// 未识别的状态（保留远程原始字符串）
    Unknown(String),
}

impl RunStatus {
    /// 是否为终态：进入终态后 Run 不会再发生任何状态变化
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    /// 与远程服务一致的字符串形式
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
            RunStatus::Unknown(raw) => raw,
        }
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            _ => RunStatus::Unknown(raw),
        }
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

/// Run 记录
///
/// 只对本地状态机需要的字段做强类型处理，其余字段（usage、last_error 等）
/// 原样保存在 `extra` 中，前端展示和本地镜像时不会丢失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// 远程 Run ID（`run_...`）
    pub id: String,

    /// 所属对话 ID
    pub thread_id: String,

    /// 执行该 Run 的助手 ID
    #[serde(default)]
    pub assistant_id: String,

    /// 当前状态
    pub status: RunStatus,

    /// 创建时间（Unix 秒）
    #[serde(default)]
    pub created_at: i64,

    /// 其余远程字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Run {
    /// Run 是否已进入终态
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
