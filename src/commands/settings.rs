//! # 设置 Tauri Commands
//!
//! - `get_app_data_path` - 获取应用数据目录路径
//! - `read_app_settings` / `save_app_settings` - 读写 `settings.json`

use tauri::State;

use crate::models::settings::AppSettings;
use crate::services::app_state::AppState;

/// 获取应用数据目录的绝对路径（设置页展示用）
#[tauri::command]
pub async fn get_app_data_path(state: State<'_, AppState>) -> Result<String, String> {
    Ok(state.data_dir().to_string_lossy().to_string())
}

/// 读取当前生效的设置
#[tauri::command]
pub async fn read_app_settings(state: State<'_, AppState>) -> Result<AppSettings, String> {
    Ok(state.settings().await)
}

/// 保存设置
///
/// 写入 `settings.json` 后立即应用：API Key、服务地址、轮询参数和助手配置
/// 对之后的请求生效，无需重启应用。
///
/// # 错误
/// 序列化失败、路径验证失败或文件写入失败时返回错误
#[tauri::command]
pub async fn save_app_settings(
    state: State<'_, AppState>,
    settings: AppSettings,
) -> Result<(), String> {
    state.save_settings(settings).await
}
