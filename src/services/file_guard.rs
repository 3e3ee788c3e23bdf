//! # 文件写入守卫服务
//!
//! 统一所有对应用数据文件（设置、会话镜像）的修改操作：
//!
//! ## 路径安全验证
//! 所有写入/删除操作前验证目标路径位于应用数据目录下，且不含 `..` 组件，
//! 防止意外修改数据目录以外的文件。
//!
//! ## 原子替换
//! 写入先落到同目录的 `.tmp` 临时文件，再通过 rename 替换目标文件。
//! 写入过程中崩溃或断电时，目标文件要么是旧内容，要么是新内容，
//! 不会出现被截断的半个 JSON。
//!
//! ## 使用方式
//! 项目中所有对应用数据文件的修改必须通过以下两个入口函数：
//! - `safe_write_file()` - 安全写入文件
//! - `safe_delete_file()` - 安全删除文件

use std::path::{Component, Path};

/// 安全写入文件（统一入口）
///
/// 执行流程：
/// 1. 验证路径在 `root` 目录下
/// 2. 确保父目录存在
/// 3. 写入临时文件并 rename 到目标路径
///
/// # 参数
/// - `root` - 允许写入的根目录（应用数据目录）
/// - `file_path` - 目标文件的绝对路径
/// - `content` - 要写入的字节内容
/// - `operation` - 操作描述（用于日志，如 "save_settings"）
///
/// # 错误
/// 路径验证失败、目录创建失败或写入失败时返回错误
pub async fn safe_write_file(
    root: &Path,
    file_path: &Path,
    content: &[u8],
    operation: &str,
) -> Result<(), String> {
    validate_data_path(root, file_path)?;

    if let Some(parent) = file_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("创建数据目录失败: {}", e))?;
    }

    let mut temp_name = file_path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = Path::new(&temp_name);

    tokio::fs::write(temp_path, content)
        .await
        .map_err(|e| format!("写入临时文件失败: {}", e))?;
    tokio::fs::rename(temp_path, file_path)
        .await
        .map_err(|e| format!("替换文件失败: {}", e))?;

    log::debug!("[{}] 已写入 {}", operation, file_path.display());
    Ok(())
}

/// 安全删除文件（统一入口）
///
/// 文件本就不存在时视为成功。
///
/// # 参数
/// - `root` - 允许删除的根目录（应用数据目录）
/// - `file_path` - 要删除的文件的绝对路径
/// - `operation` - 操作描述（用于日志）
///
/// # 错误
/// 路径验证失败或删除失败时返回错误
pub async fn safe_delete_file(
    root: &Path,
    file_path: &Path,
    operation: &str,
) -> Result<(), String> {
    validate_data_path(root, file_path)?;

    match tokio::fs::remove_file(file_path).await {
        Ok(()) => {
            log::debug!("[{}] 已删除 {}", operation, file_path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("删除文件失败: {}", e)),
    }
}

/// 验证路径是否在数据目录下
///
/// 目标文件可能尚不存在，无法使用 `canonicalize`，
/// 因此改为逐组件检查：拒绝 `..`，并要求路径以 `root` 为前缀。
fn validate_data_path(root: &Path, file_path: &Path) -> Result<(), String> {
    let has_parent_component = file_path
        .components()
        .any(|c| matches!(c, Component::ParentDir));

    if has_parent_component || !file_path.starts_with(root) || file_path == root {
        return Err(format!(
            "安全检查失败：路径 {} 不在数据目录 {} 下",
            file_path.display(),
            root.display()
        ));
    }

    Ok(())
}
