//! # 业务逻辑服务模块
//!
//! 包含核心业务逻辑的实现，与 Tauri command 层解耦：
//! - `openai` - 远程 Assistants API 客户端及其 trait 抽象
//! - `session` - 对话会话：助手、对话、消息发送和 Run 生命周期
//! - `poller` - 单一所有权、可取消的 Run 轮询任务
//! - `store` - 共享界面状态容器和提示广播
//! - `mirror` - 本地会话镜像（重启后恢复状态）
//! - `events` - 把状态和提示推送到前端
//! - `proxy` / `proxy_server` - 代理端点分发及本地 HTTP 服务
//! - `app_state` - Tauri managed state 及设置的读写
//! - `file_guard` - 文件写入守卫：统一数据文件修改入口

pub mod app_state;
pub mod events;
pub mod file_guard;
pub mod mirror;
pub mod openai;
pub mod poller;
pub mod proxy;
pub mod proxy_server;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
