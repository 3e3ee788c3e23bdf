//! # 数据模型模块
//!
//! 定义了与远程 Assistants API 及前端 TypeScript 类型对应的 Rust 数据结构。
//! 所有结构体均派生 `Serialize` 和 `Deserialize`，用于 Tauri IPC 传输、
//! 远程接口解析和本地镜像文件读写。
//! - `assistant` - 助手对象及创建配置
//! - `thread` - 对话对象及删除响应
//! - `message` - 对话消息及排序
//! - `run` - Run 对象及状态枚举
//! - `settings` - 应用设置
//! - `state` - 推送给前端的界面状态快照

pub mod assistant;
pub mod message;
pub mod run;
pub mod settings;
pub mod state;
pub mod thread;
