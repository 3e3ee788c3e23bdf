//! # 本地会话镜像
//!
//! 以键值形式保存最近一次的助手、对话和 Run 对象（`session.json`），
//! 仅用于应用重启后恢复界面状态，不做版本管理。
//!
//! ## 文件格式
//! 单个 JSON 对象，键为 `assistant` / `thread` / `run`，值为远程对象原样序列化：
//! ```json
//! { "thread": { "id": "thread_abc", ... }, "run": { "id": "run_xyz", ... } }
//! ```
//!
//! ## 缺失与损坏
//! - 文件不存在：视为空镜像
//! - 文件无法解析或顶层不是对象：记录警告，视为空镜像，下次写入时覆盖
//! - 单个条目结构不符：记录警告并丢弃该条目，其余条目照常恢复
//! - Run 必须属于镜像中的对话，否则丢弃（Run 总是引用一个存在的 Thread）

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::models::assistant::Assistant;
use crate::models::run::Run;
use crate::models::thread::Thread;
use crate::services::file_guard;
use crate::utils::path;

const ASSISTANT_KEY: &str = "assistant";
const THREAD_KEY: &str = "thread";
const RUN_KEY: &str = "run";

/// 从镜像恢复出的对象
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirroredSession {
    pub assistant: Option<Assistant>,
    pub thread: Option<Thread>,
    pub run: Option<Run>,
}

/// 会话镜像
///
/// 内部互斥锁串行化"读取-修改-写回"，避免并发写入互相覆盖条目。
pub struct SessionMirror {
    root: PathBuf,
    file: PathBuf,
    lock: Mutex<()>,
}

impl SessionMirror {
    /// 在指定数据目录下创建镜像（文件延迟到首次写入时创建）
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
            file: path::session_file(data_dir),
            lock: Mutex::new(()),
        }
    }

    /// 读取镜像，按文件头部说明的规则处理缺失和损坏的数据
    pub async fn load(&self) -> MirroredSession {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await;

        let assistant = decode_entry::<Assistant>(&entries, ASSISTANT_KEY);
        let thread = decode_entry::<Thread>(&entries, THREAD_KEY);
        let run = decode_entry::<Run>(&entries, RUN_KEY).filter(|run| {
            let belongs = thread.as_ref().is_some_and(|t| t.id == run.thread_id);
            if !belongs {
                log::warn!("镜像中的 Run {} 不属于当前对话，已丢弃", run.id);
            }
            belongs
        });

        MirroredSession {
            assistant,
            thread,
            run,
        }
    }

    pub async fn save_assistant(&self, assistant: &Assistant) -> Result<(), String> {
        self.put(ASSISTANT_KEY, assistant).await
    }

    pub async fn remove_assistant(&self) -> Result<(), String> {
        self.remove(ASSISTANT_KEY).await
    }

    pub async fn save_thread(&self, thread: &Thread) -> Result<(), String> {
        self.put(THREAD_KEY, thread).await
    }

    pub async fn remove_thread(&self) -> Result<(), String> {
        self.remove(THREAD_KEY).await
    }

    pub async fn save_run(&self, run: &Run) -> Result<(), String> {
        self.put(RUN_KEY, run).await
    }

    pub async fn remove_run(&self) -> Result<(), String> {
        self.remove(RUN_KEY).await
    }

    async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        let value = serde_json::to_value(value).map_err(|e| format!("序列化镜像条目失败: {}", e))?;
        self.write_entry(key, Some(value)).await
    }

    async fn remove(&self, key: &str) -> Result<(), String> {
        self.write_entry(key, None).await
    }

    /// 修改单个条目并写回；所有条目都被移除后删除文件
    async fn write_entry(&self, key: &str, value: Option<Value>) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await;

        match value {
            Some(value) => {
                entries.insert(key.to_string(), value);
            }
            None => {
                if entries.remove(key).is_none() {
                    return Ok(());
                }
            }
        }

        if entries.is_empty() {
            return file_guard::safe_delete_file(&self.root, &self.file, "mirror_clear").await;
        }

        let content = serde_json::to_string_pretty(&Value::Object(entries))
            .map_err(|e| format!("序列化会话镜像失败: {}", e))?;
        file_guard::safe_write_file(&self.root, &self.file, content.as_bytes(), "mirror_write")
            .await
    }

    /// 读取全部条目；调用方需持有锁
    async fn read_entries(&self) -> Map<String, Value> {
        let content = match tokio::fs::read_to_string(&self.file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Map::new(),
            Err(e) => {
                log::warn!("读取会话镜像失败，按空镜像处理: {}", e);
                return Map::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(entries)) => entries,
            Ok(_) => {
                log::warn!("会话镜像顶层不是对象，按空镜像处理");
                Map::new()
            }
            Err(e) => {
                log::warn!("解析会话镜像失败，按空镜像处理: {}", e);
                Map::new()
            }
        }
    }
}

/// 解码单个条目，结构不符时记录警告并返回 `None`
fn decode_entry<T: DeserializeOwned>(entries: &Map<String, Value>, key: &str) -> Option<T> {
    let value = entries.get(key)?;
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            log::warn!("镜像条目 {} 结构不符，已丢弃: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thread(id: &str) -> Thread {
        serde_json::from_value(json!({ "id": id, "created_at": 1 })).unwrap()
    }

    fn run(id: &str, thread_id: &str) -> Run {
        serde_json::from_value(json!({ "id": id, "thread_id": thread_id, "status": "in_progress" }))
            .unwrap()
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = SessionMirror::new(dir.path());
        assert_eq!(mirror.load().await, MirroredSession::default());
    }

    #[tokio::test]
    async fn entries_are_written_and_removed_in_lockstep() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = SessionMirror::new(dir.path());

        mirror.save_thread(&thread("thread_1")).await.unwrap();
        mirror.save_run(&run("run_1", "thread_1")).await.unwrap();
        let loaded = mirror.load().await;
        assert_eq!(loaded.thread.unwrap().id, "thread_1");
        assert_eq!(loaded.run.unwrap().id, "run_1");

        mirror.remove_run().await.unwrap();
        mirror.remove_thread().await.unwrap();
        assert_eq!(mirror.load().await, MirroredSession::default());
        assert!(!path::session_file(dir.path()).exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_ignored_and_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let file = path::session_file(dir.path());
        std::fs::write(&file, "{ not json").unwrap();

        let mirror = SessionMirror::new(dir.path());
        assert_eq!(mirror.load().await, MirroredSession::default());

        mirror.save_thread(&thread("thread_2")).await.unwrap();
        assert_eq!(mirror.load().await.thread.unwrap().id, "thread_2");
    }

    #[tokio::test]
    async fn malformed_entries_and_orphan_runs_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let file = path::session_file(dir.path());
        std::fs::write(
            &file,
            json!({
                "assistant": { "name": "missing id" },
                "thread": { "id": "thread_1" },
                "run": { "id": "run_9", "thread_id": "thread_other", "status": "queued" }
            })
            .to_string(),
        )
        .unwrap();

        let loaded = SessionMirror::new(dir.path()).load().await;
        assert!(loaded.assistant.is_none());
        assert_eq!(loaded.thread.unwrap().id, "thread_1");
        assert!(loaded.run.is_none());
    }
}
