//! # Assistant Chat - Tauri 桌面应用原生入口点
//!
//! 核心逻辑位于 `lib.rs` 中，以便在桌面端和移动端之间共享代码。

// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    app_lib::run();
}
