//! # 应用设置数据模型
//!
//! 定义了应用设置（AppSettings）及其子结构，存储在 `~/.assistant-chat/settings.json`。
//!
//! 所有字段都带有默认值：设置文件缺失或只包含部分字段时，
//! 缺失字段自动回落到默认值，旧版本设置文件可以直接被新版本读取。

use serde::{Deserialize, Serialize};

use crate::models::assistant::AssistantConfig;

/// 远程服务默认地址
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// 默认轮询间隔（毫秒）
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// 默认允许的连续轮询失败次数
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 3;

/// API Key 环境变量名（设置文件未填写时回落）
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 服务地址环境变量名（设置文件未填写时回落）
pub const API_BASE_ENV: &str = "OPENAI_BASE_URL";

/// 应用设置
///
/// 对应前端 TypeScript 接口：
/// ```typescript
/// interface AppSettings {
///   apiKey: string | null;
///   apiBase: string | null;
///   assistant: AssistantConfig;
///   pollIntervalMs: number;
///   maxPollFailures: number;
///   proxy: ProxySettings;
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// 远程服务 API Key；为空时读取 `OPENAI_API_KEY`
    pub api_key: Option<String>,

    /// 远程服务地址；为空时读取 `OPENAI_BASE_URL`，再回落到官方地址
    pub api_base: Option<String>,

    /// 创建助手时使用的配置
    pub assistant: AssistantConfig,

    /// Run 状态轮询间隔（毫秒）
    pub poll_interval_ms: u64,

    /// 连续轮询失败多少次后停止轮询并提示连接中断
    pub max_poll_failures: u32,

    /// 本地 HTTP 代理端点设置
    pub proxy: ProxySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: None,
            assistant: AssistantConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            proxy: ProxySettings::default(),
        }
    }
}

impl AppSettings {
    /// 解析最终生效的 API Key：设置文件优先，其次环境变量
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(std::env::var(API_KEY_ENV).ok()))
    }

    /// 解析最终生效的服务地址（去掉末尾 `/`）
    pub fn resolved_api_base(&self) -> String {
        non_empty(self.api_base.clone())
            .or_else(|| non_empty(std::env::var(API_BASE_ENV).ok()))
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

/// 本地代理端点设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxySettings {
    /// 是否在启动时监听本地端口
    pub enabled: bool,

    /// 监听地址
    pub host: String,

    /// 监听端口
    pub port: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// 本地代理服务的运行信息（本机脚本调用时需要令牌）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    /// 实际监听地址，未启动时为 `None`
    pub address: Option<String>,

    /// 请求头 `x-assistant-chat-token` 的值
    pub token: String,
}

/// 空白字符串视为未设置
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{ "pollIntervalMs": 250, "proxy": { "port": 9000 } }"#).unwrap();
        assert_eq!(settings.poll_interval_ms, 250);
        assert_eq!(settings.max_poll_failures, DEFAULT_MAX_POLL_FAILURES);
        assert_eq!(settings.proxy.port, 9000);
        assert_eq!(settings.proxy.host, "127.0.0.1");
        assert_eq!(settings.assistant, AssistantConfig::default());
    }

    #[test]
    fn configured_values_win_over_environment() {
        let settings = AppSettings {
            api_key: Some("  sk-file  ".to_string()),
            api_base: Some("http://localhost:9999/v1/".to_string()),
            ..AppSettings::default()
        };
        assert_eq!(settings.resolved_api_key().as_deref(), Some("sk-file"));
        assert_eq!(settings.resolved_api_base(), "http://localhost:9999/v1");
    }
}
