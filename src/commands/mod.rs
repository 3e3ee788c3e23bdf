//! # Tauri Command 处理模块
//!
//! 本模块包含所有注册到 Tauri 的 command 处理函数。
//! 每个子模块对应一个功能域：
//! - `chat` - 助手、对话、消息和 Run 的界面操作
//! - `proxy` - 透传到远程服务的代理端点
//! - `settings` - 应用设置的读写

pub mod chat;
pub mod proxy;
pub mod settings;
