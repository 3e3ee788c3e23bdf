//! # Assistant Chat - Tauri 应用核心初始化模块
//!
//! 本模块负责 Tauri 应用的完整初始化流程，包括：
//! - 注册日志插件
//! - 初始化应用全局状态（设置、远程客户端、对话会话）
//! - 注册自定义 Tauri commands（对话操作、代理端点、设置管理）
//! - 启动时恢复会话、转发状态事件、启动本地代理服务
//! - 退出时停止轮询任务
//!
//! ## 架构说明
//! 通过将核心逻辑放在 `lib.rs` 而非 `main.rs` 中，
//! Tauri 可以在桌面端（`main.rs`）和移动端入口之间共享此初始化代码。
//!
//! ## 模块结构
//! - `commands/` - Tauri command 处理函数（IPC 接口层）
//! - `models/` - 数据模型（对应前端 TypeScript 类型）
//! - `services/` - 核心业务逻辑（会话、轮询、镜像、代理）
//! - `utils/` - 通用工具函数

mod commands;
mod models;
mod services;
mod utils;

use std::sync::Arc;

use tauri::{Manager, RunEvent};

use services::app_state::AppState;
use services::events::{self, EventSink, TauriEventSink};
use services::proxy_server;

#[cfg_attr(mobile, tauri::mobile_entry_point)]
/// Tauri 应用启动函数
///
/// 1. 注册日志插件（调试构建 Info，发布构建 Warn）
/// 2. 在 `setup` 钩子中加载设置并注册 `AppState`
/// 3. 后台恢复会话、启动事件转发和代理服务
/// 4. 退出事件中停止轮询
///
/// # Panics
/// 如果 Tauri 应用启动失败（例如配置文件缺失或窗口创建失败），
/// 将通过 `.expect()` 触发 panic 并输出错误信息。
pub fn run() {
    let log_level = if cfg!(debug_assertions) {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_log::Builder::default().level(log_level).build())
        .invoke_handler(tauri::generate_handler![
            // 对话操作 commands
            commands::chat::get_chat_state,
            commands::chat::create_assistant,
            commands::chat::delete_assistant,
            commands::chat::create_thread,
            commands::chat::delete_thread,
            commands::chat::fetch_messages,
            commands::chat::set_draft,
            commands::chat::send_message,
            commands::chat::send_and_run,
            commands::chat::create_run,
            commands::chat::cancel_run,
            commands::chat::resume_polling,
            // 代理端点 commands
            commands::proxy::proxy_request,
            commands::proxy::get_proxy_info,
            // 设置 commands
            commands::settings::get_app_data_path,
            commands::settings::read_app_settings,
            commands::settings::save_app_settings,
        ])
        .setup(|app| {
            let data_dir = utils::path::get_app_data_path()?;
            let state = tauri::async_runtime::block_on(AppState::initialize(data_dir));
            let session = state.session.clone();
            let proxy_settings = tauri::async_runtime::block_on(state.settings()).proxy;
            let proxy_token = state.proxy_token().to_string();
            app.manage(state);

            let sink: Arc<dyn EventSink> = Arc::new(TauriEventSink::new(app.handle().clone()));
            tauri::async_runtime::spawn(events::forward(Arc::clone(session.store()), sink));

            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                session.rehydrate().await;
                if !proxy_settings.enabled {
                    log::info!("本地代理服务未启用");
                    return;
                }
                match proxy_server::spawn(&proxy_settings, session, proxy_token).await {
                    Ok(address) => handle.state::<AppState>().set_proxy_address(address).await,
                    Err(e) => log::error!("启动本地代理服务失败: {}", e),
                }
            });
            Ok(())
        })
        // `tauri::generate_context!()` 宏：在编译时读取 `tauri.conf.json` 配置文件，
        // 生成包含应用名称、窗口配置、安全策略等信息的上下文对象。
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<AppState>() {
                state.session.shutdown();
            }
        }
    });
}
