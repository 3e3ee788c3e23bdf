//! # Assistant Chat - Tauri Cargo 构建脚本
//!
//! Tauri 利用此脚本生成运行时所需的资源绑定代码，
//! 并处理应用图标、权限清单（`capabilities/`）等静态资源。

fn main() {
  tauri_build::build()
}
