//! # 远程 Assistants API 客户端
//!
//! 所有有意义的操作（助手创建、消息存储、Run 执行）都在远程服务完成，
//! 本模块只负责把调用翻译成 HTTP 请求并解析响应。
//!
//! ## 抽象边界
//! `AssistantApi` trait 是本地逻辑与远程服务之间唯一的接缝：
//! - 生产环境使用基于 `reqwest` 的 `OpenAiClient`
//! - 测试中注入脚本化的 Mock 实现，无需网络
//!
//! ## 配置热更新
//! API Key 和服务地址保存在 `RwLock` 中，用户保存设置后立即生效，
//! 无需重建客户端或重启应用。

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::models::assistant::{Assistant, AssistantConfig};
use crate::models::message::ThreadMessage;
use crate::models::run::Run;
use crate::models::settings::AppSettings;
use crate::models::thread::{DeletionStatus, Thread};

/// 单次请求超时（秒）
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// 拉取消息列表时的单页上限（远程服务允许的最大值）
const MESSAGE_PAGE_LIMIT: &str = "100";

/// Assistants API 版本请求头
const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// 远程调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("未配置 API Key（请在设置中填写或设置 OPENAI_API_KEY 环境变量）")]
    MissingApiKey,

    #[error("请求远程服务失败: {message}")]
    Request { message: String },

    #[error("远程服务返回 HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("解析远程响应失败: {message}")]
    Decode { message: String },
}

impl ApiError {
    /// 映射为代理端点应返回的 HTTP 状态码
    ///
    /// 远程服务的错误状态原样透传，传输层和解析错误统一视为 502。
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MissingApiKey => 401,
            ApiError::Request { .. } | ApiError::Decode { .. } => 502,
            ApiError::Http { status, .. } => *status,
        }
    }

    /// 面向用户的错误描述
    ///
    /// 远程服务返回 `{ "error": { "message": ... } }` 时只取其中的 message，
    /// 其余情况使用完整的错误文本。
    pub fn user_message(&self) -> String {
        if let ApiError::Http { body, .. } = self {
            let parsed: Option<Value> = serde_json::from_str(body).ok();
            if let Some(message) = parsed
                .as_ref()
                .and_then(|v| v.pointer("/error/message"))
                .and_then(Value::as_str)
            {
                return message.to_string();
            }
        }
        self.to_string()
    }
}

/// 远程 Assistants 服务的操作集合
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, ApiError>;

    async fn delete_assistant(&self, assistant_id: &str) -> Result<DeletionStatus, ApiError>;

    async fn create_thread(&self) -> Result<Thread, ApiError>;

    async fn delete_thread(&self, thread_id: &str) -> Result<DeletionStatus, ApiError>;

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<ThreadMessage, ApiError>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError>;

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError>;
}

/// 客户端连接配置
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    /// API Key；`None` 时所有请求直接返回 `MissingApiKey`
    pub api_key: Option<String>,
    /// 服务地址（不含末尾 `/`），如 `https://api.openai.com/v1`
    pub api_base: String,
}

impl OpenAiConfig {
    /// 从应用设置解析连接配置（含环境变量回落）
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            api_key: settings.resolved_api_key(),
            api_base: settings.resolved_api_base(),
        }
    }
}

/// 列表接口的分页包装：`{ "object": "list", "data": [...] }`
#[derive(Deserialize)]
struct ListPage<T> {
    data: Vec<T>,
}

/// 基于 reqwest 的 Assistants API 客户端
pub struct OpenAiClient {
    http: reqwest::Client,
    config: RwLock<OpenAiConfig>,
}

impl OpenAiClient {
    /// 创建客户端
    pub fn new(config: OpenAiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("构建 HTTP 客户端失败，使用默认配置: {}", e);
                reqwest::Client::new()
            });
        Self {
            http,
            config: RwLock::new(config),
        }
    }

    /// 替换连接配置（设置保存后调用）
    pub fn update_config(&self, config: OpenAiConfig) {
        if let Ok(mut current) = self.config.write() {
            *current = config;
        }
    }

    /// 当前生效的服务地址和 API Key
    fn credentials(&self) -> Result<(String, String), ApiError> {
        let config = self
            .config
            .read()
            .map_err(|e| ApiError::Request {
                message: format!("读取客户端配置失败: {}", e),
            })?;
        let key = config.api_key.clone().ok_or(ApiError::MissingApiKey)?;
        Ok((config.api_base.clone(), key))
    }

    /// 发送请求并将成功响应解析为 `T`
    ///
    /// 非 2xx 响应保留原始响应体，供代理端点透传和前端展示错误详情。
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let (base, key) = self.credentials()?;
        let url = format!("{}{}", base, path);

        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| ApiError::Request {
            message: e.to_string(),
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Request {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            log::warn!("{} {} -> HTTP {}", method, path, status.as_u16());
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl AssistantApi for OpenAiClient {
    async fn create_assistant(&self, config: &AssistantConfig) -> Result<Assistant, ApiError> {
        let body = json!({
            "name": config.name,
            "instructions": config.instructions,
            "model": config.model,
            "tools": config.tools,
        });
        self.send(Method::POST, "/assistants", &[], Some(body)).await
    }

    async fn delete_assistant(&self, assistant_id: &str) -> Result<DeletionStatus, ApiError> {
        let path = format!("/assistants/{}", assistant_id);
        self.send(Method::DELETE, &path, &[], None).await
    }

    async fn create_thread(&self) -> Result<Thread, ApiError> {
        self.send(Method::POST, "/threads", &[], Some(json!({}))).await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<DeletionStatus, ApiError> {
        let path = format!("/threads/{}", thread_id);
        self.send(Method::DELETE, &path, &[], None).await
    }

    async fn create_message(&self, thread_id: &str, text: &str) -> Result<ThreadMessage, ApiError> {
        let path = format!("/threads/{}/messages", thread_id);
        let body = json!({ "role": "user", "content": text });
        self.send(Method::POST, &path, &[], Some(body)).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ApiError> {
        let path = format!("/threads/{}/messages", thread_id);
        let page: ListPage<ThreadMessage> = self
            .send(
                Method::GET,
                &path,
                &[("order", "asc"), ("limit", MESSAGE_PAGE_LIMIT)],
                None,
            )
            .await?;
        Ok(page.data)
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run, ApiError> {
        let path = format!("/threads/{}/runs", thread_id);
        let body = json!({ "assistant_id": assistant_id });
        self.send(Method::POST, &path, &[], Some(body)).await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let path = format!("/threads/{}/runs/{}", thread_id, run_id);
        self.send(Method::GET, &path, &[], None).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ApiError> {
        let path = format!("/threads/{}/runs/{}/cancel", thread_id, run_id);
        self.send(Method::POST, &path, &[], None).await
    }
}
