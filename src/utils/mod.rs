//! # 通用工具函数
//!
//! - `path` - 应用数据目录及数据文件路径

pub mod path;
