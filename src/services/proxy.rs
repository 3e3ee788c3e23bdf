//! # 代理端点
//!
//! 把前端（或本地 HTTP 客户端）的请求参数原样转发给远程服务，并把结果包装成
//! `{status, body}`。IPC command `proxy_request` 和 `proxy_server` 共用这里的分发逻辑。
//!
//! ## 端点表
//! | 端点 | 参数 | 成功响应体 |
//! |------|------|-----------|
//! | `assistant.create` | - | `{ assistant }` |
//! | `assistant.delete` | `assistantId` | 远程删除响应 |
//! | `thread.create` | - | `{ thread }` |
//! | `thread.delete` | `threadId` | 远程删除响应 |
//! | `message.create` | `threadId`, `message` | `{ message }` |
//! | `message.list` | `threadId` | `{ messages }` |
//! | `run.create` | `threadId`, `assistantId` | `{ run }` |
//! | `run.retrieve` | `threadId`, `runId` | `{ run }` |
//! | `run.cancel` | `threadId`, `runId` | `{ run }` |
//!
//! ## 错误响应
//! `{ "error": { "message": ..., "status": ... } }`：缺少参数为 400，
//! 未知端点为 404，远程错误沿用上游状态码。缺少参数时不会发起远程调用。

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::models::assistant::AssistantConfig;
use crate::services::openai::{ApiError, AssistantApi};

/// 代理端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyEndpoint {
    AssistantCreate,
    AssistantDelete,
    ThreadCreate,
    ThreadDelete,
    MessageCreate,
    MessageList,
    RunCreate,
    RunRetrieve,
    RunCancel,
}

impl ProxyEndpoint {
    const ALL: [ProxyEndpoint; 9] = [
        ProxyEndpoint::AssistantCreate,
        ProxyEndpoint::AssistantDelete,
        ProxyEndpoint::ThreadCreate,
        ProxyEndpoint::ThreadDelete,
        ProxyEndpoint::MessageCreate,
        ProxyEndpoint::MessageList,
        ProxyEndpoint::RunCreate,
        ProxyEndpoint::RunRetrieve,
        ProxyEndpoint::RunCancel,
    ];

    /// 端点名（`group.action`）
    pub fn name(self) -> &'static str {
        match self {
            ProxyEndpoint::AssistantCreate => "assistant.create",
            ProxyEndpoint::AssistantDelete => "assistant.delete",
            ProxyEndpoint::ThreadCreate => "thread.create",
            ProxyEndpoint::ThreadDelete => "thread.delete",
            ProxyEndpoint::MessageCreate => "message.create",
            ProxyEndpoint::MessageList => "message.list",
            ProxyEndpoint::RunCreate => "run.create",
            ProxyEndpoint::RunRetrieve => "run.retrieve",
            ProxyEndpoint::RunCancel => "run.cancel",
        }
    }

    /// 只读端点（不产生远程副作用），HTTP 服务允许以 GET 调用
    pub fn is_read_only(self) -> bool {
        matches!(self, ProxyEndpoint::MessageList | ProxyEndpoint::RunRetrieve)
    }

    /// 按端点名查找，如 `"run.cancel"`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|endpoint| endpoint.name() == name)
    }

    /// 按 HTTP 路径查找，如 `/api/run/cancel`（允许末尾斜杠）
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/api/")?.trim_end_matches('/');
        let (group, action) = rest.split_once('/')?;
        if action.contains('/') {
            return None;
        }
        Self::from_name(&format!("{}.{}", group, action))
    }
}

/// 代理响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Value,
}

impl ProxyResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    /// 错误响应
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": { "message": message.into(), "status": status } }),
        }
    }

    /// 未知端点
    pub fn not_found(endpoint: &str) -> Self {
        Self::error(404, format!("未知的代理端点: {}", endpoint))
    }

    fn from_api_error(endpoint: ProxyEndpoint, error: ApiError) -> Self {
        log::error!("代理请求 {} 失败: {}", endpoint.name(), error);
        Self::error(error.status(), error.user_message())
    }
}

/// 缺少参数的错误
struct MissingParam(&'static str);

/// 读取必填的字符串参数（空字符串视为缺失）
fn required<'a>(
    params: &'a Map<String, Value>,
    key: &'static str,
) -> Result<&'a str, MissingParam> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or(MissingParam(key))
}

fn wrap<T: Serialize>(key: &str, value: &T) -> Result<Value, ApiError> {
    let value = serde_json::to_value(value).map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })?;
    let mut body = Map::new();
    body.insert(key.to_string(), value);
    Ok(Value::Object(body))
}

fn raw<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })
}

/// 分发代理请求
///
/// # 参数
/// - `api` - 远程服务客户端
/// - `assistant` - `assistant.create` 使用的助手配置
/// - `endpoint` - 目标端点
/// - `params` - 请求参数（键为 camelCase）
pub async fn dispatch(
    api: &dyn AssistantApi,
    assistant: &AssistantConfig,
    endpoint: ProxyEndpoint,
    params: &Map<String, Value>,
) -> ProxyResponse {
    log::debug!("代理请求: {}", endpoint.name());
    match forward(api, assistant, endpoint, params).await {
        Ok(Ok(body)) => ProxyResponse::ok(body),
        Ok(Err(error)) => ProxyResponse::from_api_error(endpoint, error),
        Err(MissingParam(key)) => {
            log::warn!("代理请求 {} 缺少参数 {}", endpoint.name(), key);
            ProxyResponse::error(400, format!("缺少参数: {}", key))
        }
    }
}

/// 先校验全部参数，再发起远程调用
async fn forward(
    api: &dyn AssistantApi,
    assistant: &AssistantConfig,
    endpoint: ProxyEndpoint,
    params: &Map<String, Value>,
) -> Result<Result<Value, ApiError>, MissingParam> {
    let result = match endpoint {
        ProxyEndpoint::AssistantCreate => api
            .create_assistant(assistant)
            .await
            .and_then(|created| wrap("assistant", &created)),
        ProxyEndpoint::AssistantDelete => {
            let assistant_id = required(params, "assistantId")?;
            api.delete_assistant(assistant_id)
                .await
                .and_then(|status| raw(&status))
        }
        ProxyEndpoint::ThreadCreate => api
            .create_thread()
            .await
            .and_then(|thread| wrap("thread", &thread)),
        ProxyEndpoint::ThreadDelete => {
            let thread_id = required(params, "threadId")?;
            api.delete_thread(thread_id)
                .await
                .and_then(|status| raw(&status))
        }
        ProxyEndpoint::MessageCreate => {
            let thread_id = required(params, "threadId")?;
            let text = required(params, "message")?;
            api.create_message(thread_id, text)
                .await
                .and_then(|message| wrap("message", &message))
        }
        ProxyEndpoint::MessageList => {
            let thread_id = required(params, "threadId")?;
            api.list_messages(thread_id)
                .await
                .and_then(|messages| wrap("messages", &messages))
        }
        ProxyEndpoint::RunCreate => {
            let thread_id = required(params, "threadId")?;
            let assistant_id = required(params, "assistantId")?;
            api.create_run(thread_id, assistant_id)
                .await
                .and_then(|run| wrap("run", &run))
        }
        ProxyEndpoint::RunRetrieve => {
            let thread_id = required(params, "threadId")?;
            let run_id = required(params, "runId")?;
            api.retrieve_run(thread_id, run_id)
                .await
                .and_then(|run| wrap("run", &run))
        }
        ProxyEndpoint::RunCancel => {
            let thread_id = required(params, "threadId")?;
            let run_id = required(params, "runId")?;
            api.cancel_run(thread_id, run_id)
                .await
                .and_then(|run| wrap("run", &run))
        }
    };
    Ok(result)
}
