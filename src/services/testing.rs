//! 测试用的脚本化远程服务
//!
//! 记录每次调用（按顺序），并按预设脚本返回 Run 状态或失败。
//! 消息列表按创建时间倒序返回（远程服务的默认顺序），用来验证本地排序。

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::models::assistant::{Assistant, AssistantConfig};
use crate::models::message::ThreadMessage;
use crate::models::run::{Run, RunStatus};
use crate::models::thread::{DeletionStatus, Thread};
use crate::services::openai::{ApiError, AssistantApi};

#[derive(Default)]
struct MockInner {
    calls: Vec<String>,
    failing: HashSet<&'static str>,
    statuses: VecDeque<Result<RunStatus, ()>>,
    last_status: Option<RunStatus>,
    cancel_status: Option<RunStatus>,
    messages: Vec<ThreadMessage>,
    clock: i64,
    next_id: u32,
}

#[derive(Default)]
pub struct MockApi {
    inner: Mutex<MockInner>,
}

impl MockApi {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().clock = 1_700_000_000;
        mock
    }

    /// 让指定操作（如 `"create_thread"`）返回 HTTP 500
    pub fn fail(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    /// 恢复指定操作
    pub fn recover(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.remove(op);
    }

    /// 依次追加 `retrieve_run` 的返回结果；`Err(())` 表示该次请求失败。
    /// 脚本耗尽后重复最后一次成功的状态。
    pub fn script(&self, steps: impl IntoIterator<Item = Result<RunStatus, ()>>) {
        self.inner.lock().unwrap().statuses.extend(steps);
    }

    /// `cancel_run` 返回的状态；默认 `cancelling`
    pub fn cancel_returns(&self, status: RunStatus) {
        self.inner.lock().unwrap().cancel_status = Some(status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// 以 `prefix` 开头的调用次数
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn begin(&self, op: &'static str, call: String) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        if inner.failing.contains(op) {
            return Err(ApiError::Http {
                status: 500,
                body: json!({ "error": { "message": format!("{} failed", op) } }).to_string(),
            });
        }
        Ok(())
    }

    fn run(id: &str, thread_id: &str, status: RunStatus) -> Run {
        serde_json::from_value(json!({
            "id": id,
            "thread_id": thread_id,
            "assistant_id": "asst_mock",
            "status": status,
            "created_at": 1
        }))
        .unwrap()
    }

    fn push_message(
        inner: &mut MockInner,
        thread_id: &str,
        role: &str,
        text: &str,
        run_id: Option<&str>,
    ) -> ThreadMessage {
        inner.clock += 1;
        inner.next_id += 1;
        let message: ThreadMessage = serde_json::from_value(json!({
            "id": format!("msg_{}", inner.next_id),
            "thread_id": thread_id,
            "role": role,
            "created_at": inner.clock,
            "run_id": run_id,
            "content": [{ "type": "text", "text": { "value": text, "annotations": [] } }]
        }))
        .unwrap();
        inner.messages.push(message.clone());
        message
    }
}

#[async_trait]
impl AssistantApi for MockApi {
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, ApiError> {
        self.begin("create_assistant", "create_assistant".to_string())?;
        Ok(serde_json::from_value(json!({
            "id": "asst_mock",
            "name": config.name,
            "model": config.model,
            "instructions": config.instructions,
            "tools": config.tools,
            "object": "assistant"
        }))
        .unwrap())
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<DeletionStatus, ApiError> {
        self.begin("delete_assistant", format!("delete_assistant:{}", assistant_id))?;
        Ok(DeletionStatus {
            id: assistant_id.to_string(),
            object: "assistant.deleted".to_string(),
            deleted: true,
        })
    }

    async fn create_thread(&self) -> Result<Thread, ApiError> {
        self.begin("create_thread", "create_thread".to_string())?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        Ok(serde_json::from_value(json!({
            "id": format!("thread_{}", inner.next_id),
            "object": "thread",
            "created_at": inner.clock
        }))
        .unwrap())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<DeletionStatus, ApiError> {
        self.begin("delete_thread", format!("delete_thread:{}", thread_id))?;
        Ok(DeletionStatus {
            id: thread_id.to_string(),
            object: "thread.deleted".to_string(),
            deleted: true,
        })
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<ThreadMessage, ApiError> {
        self.begin("create_message", format!("create_message:{}:{}", thread_id, text))?;
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::push_message(&mut inner, thread_id, "user", text, None))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError> {
        self.begin("list_messages", format!("list_messages:{}", thread_id))?;
        let inner = self.inner.lock().unwrap();
        let mut messages: Vec<ThreadMessage> = inner
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError> {
        self.begin("create_run", format!("create_run:{}:{}", thread_id, assistant_id))?;
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = format!("run_{}", inner.next_id);
        Ok(Self::run(&id, thread_id, RunStatus::Queued))
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        self.begin("retrieve_run", format!("retrieve_run:{}:{}", thread_id, run_id))?;
        let mut inner = self.inner.lock().unwrap();
        let status = match inner.statuses.pop_front() {
            Some(Ok(status)) => status,
            Some(Err(())) => {
                return Err(ApiError::Request {
                    message: "connection reset".to_string(),
                });
            }
            None => inner.last_status.clone().unwrap_or(RunStatus::InProgress),
        };
        inner.last_status = Some(status.clone());

        let replied = inner
            .messages
            .iter()
            .any(|m| m.run_id.as_deref() == Some(run_id));
        if status == RunStatus::Completed && !replied {
            let reply = "Hi! How can I help?";
            Self::push_message(&mut inner, thread_id, "assistant", reply, Some(run_id));
        }
        Ok(Self::run(run_id, thread_id, status))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        self.begin("cancel_run", format!("cancel_run:{}:{}", thread_id, run_id))?;
        let status = self
            .inner
            .lock()
            .unwrap()
            .cancel_status
            .clone()
            .unwrap_or(RunStatus::Cancelling);
        Ok(Self::run(run_id, thread_id, status))
    }
}
