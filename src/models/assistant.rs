//! # 助手数据模型
//!
//! 助手（Assistant）是远程服务上的配置对象，决定了 Run 的行为（指令、工具、模型）。
//! 本地只在创建时提交配置，之后通过 ID 引用。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 默认助手名称
const DEFAULT_ASSISTANT_NAME: &str = "Resume Parser";

/// 默认模型
const DEFAULT_ASSISTANT_MODEL: &str = "gpt-3.5-turbo-0125";

/// 默认助手指令：简历解析机器人
const DEFAULT_ASSISTANT_INSTRUCTIONS: &str = "You're an advanced chat bot tailored for resume parsing, \
enabling users to effortlessly extract key information from their resumes. Gather contact information, \
educational qualifications, work experience, skills, and additional relevant information, and present \
the extracted details as a clear, organized, structured breakdown that is easy to read. Keep responses \
coherent, relevant and accurate.";

/// 远程助手对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    /// 远程助手 ID（`asst_...`）
    pub id: String,

    /// 助手名称
    #[serde(default)]
    pub name: Option<String>,

    /// 使用的模型
    #[serde(default)]
    pub model: String,

    /// 系统指令
    #[serde(default)]
    pub instructions: Option<String>,

    /// 启用的工具列表（`{ "type": "file_search" }` 等）
    #[serde(default)]
    pub tools: Vec<Value>,

    /// 创建时间（Unix 秒）
    #[serde(default)]
    pub created_at: i64,

    /// 其余远程字段
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// 创建助手时提交的固定配置
///
/// 存储在应用设置中，`assistant.create` 端点不接收任何参数，始终使用此配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// 助手名称
    pub name: String,

    /// 系统指令
    pub instructions: String,

    /// 模型名称
    pub model: String,

    /// 工具列表，原样提交给远程服务
    #[serde(default)]
    pub tools: Vec<Value>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: DEFAULT_ASSISTANT_INSTRUCTIONS.to_string(),
            model: DEFAULT_ASSISTANT_MODEL.to_string(),
            tools: vec![serde_json::json!({ "type": "file_search" })],
        }
    }
}
