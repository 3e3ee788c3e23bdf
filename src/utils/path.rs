//! # 路径工具函数
//!
//! 提供应用数据文件的路径解析：
//! - 应用数据目录（`~/.assistant-chat/`）
//! - 设置文件（`settings.json`）
//! - 会话镜像文件（`session.json`）

use std::path::{Path, PathBuf};

/// 应用数据目录名
const APP_DIR_NAME: &str = ".assistant-chat";

/// 设置文件名
const SETTINGS_FILE_NAME: &str = "settings.json";

/// 会话镜像文件名
const SESSION_FILE_NAME: &str = "session.json";

/// 获取应用数据目录的绝对路径
///
/// 使用 `dirs` crate 获取跨平台的主目录路径。
///
/// # 错误
/// 如果无法确定用户主目录（极端情况，如无 HOME 环境变量），返回错误信息。
///
/// # 示例
/// - Windows: `C:\Users\username\.assistant-chat`
/// - Linux/macOS: `/home/username/.assistant-chat`
pub fn get_app_data_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "无法获取用户主目录".to_string())?;
    Ok(home.join(APP_DIR_NAME))
}

/// 数据目录下的设置文件路径
pub fn settings_file(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE_NAME)
}

/// 数据目录下的会话镜像文件路径
pub fn session_file(data_dir: &Path) -> PathBuf {
    data_dir.join(SESSION_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_files_live_in_data_dir() {
        let dir = Path::new("/tmp/app");
        assert_eq!(settings_file(dir), dir.join("settings.json"));
        assert_eq!(session_file(dir), dir.join("session.json"));
    }
}
