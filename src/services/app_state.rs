//! # 应用全局状态
//!
//! 注册为 Tauri managed state，command 通过 `State<AppState>` 注入访问：
//! - `session` - 对话会话（状态容器、轮询、镜像）
//! - `client` - 远程服务客户端（设置变更时热更新）
//! - `settings` - 当前生效的应用设置
//! - `proxy_token` / `proxy_address` - 本地代理服务的访问令牌和监听地址

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::settings::{AppSettings, ProxyInfo};
use crate::services::file_guard;
use crate::services::mirror::SessionMirror;
use crate::services::openai::{AssistantApi, OpenAiClient, OpenAiConfig};
use crate::services::proxy_server;
use crate::services::session::{ChatSession, PollOptions};
use crate::services::store::ChatStore;
use crate::utils::path;

pub struct AppState {
    pub session: ChatSession,
    client: Arc<OpenAiClient>,
    settings: RwLock<AppSettings>,
    data_dir: PathBuf,
    /// 每次启动重新生成，不持久化
    proxy_token: String,
    proxy_address: RwLock<Option<SocketAddr>>,
}

impl AppState {
    /// 读取设置并构建会话
    pub async fn initialize(data_dir: PathBuf) -> Self {
        let settings = load_settings(&data_dir).await;
        let client = Arc::new(OpenAiClient::new(OpenAiConfig::from_settings(&settings)));
        let api: Arc<dyn AssistantApi> = client.clone();
        let session = ChatSession::new(
            api,
            Arc::new(ChatStore::new()),
            SessionMirror::new(&data_dir),
            PollOptions::from_settings(&settings),
            settings.assistant.clone(),
        );

        Self {
            session,
            client,
            settings: RwLock::new(settings),
            data_dir,
            proxy_token: proxy_server::generate_token(),
            proxy_address: RwLock::new(None),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 当前设置
    pub async fn settings(&self) -> AppSettings {
        self.settings.read().await.clone()
    }

    pub fn proxy_token(&self) -> &str {
        &self.proxy_token
    }

    /// 记录代理服务实际监听的地址
    pub async fn set_proxy_address(&self, address: SocketAddr) {
        *self.proxy_address.write().await = Some(address);
    }

    pub async fn proxy_info(&self) -> ProxyInfo {
        ProxyInfo {
            address: self.proxy_address.read().await.map(|addr| addr.to_string()),
            token: self.proxy_token.clone(),
        }
    }

    /// 保存设置并立即应用到客户端和会话
    ///
    /// 代理服务的监听地址只在启动时读取，修改后需重启应用。
    pub async fn save_settings(&self, settings: AppSettings) -> Result<(), String> {
        let content = serde_json::to_string_pretty(&settings)
            .map_err(|e| format!("序列化设置失败: {}", e))?;
        file_guard::safe_write_file(
            &self.data_dir,
            &path::settings_file(&self.data_dir),
            content.as_bytes(),
            "save_settings",
        )
        .await?;

        self.client.update_config(OpenAiConfig::from_settings(&settings));
        self.session.apply_settings(&settings);
        *self.settings.write().await = settings;
        log::info!("设置已保存并生效");
        Ok(())
    }
}

/// 读取设置文件
///
/// 文件不存在时使用默认设置；无法解析时记录警告并使用默认设置，
/// 避免一份损坏的设置文件让应用无法启动。
pub async fn load_settings(data_dir: &Path) -> AppSettings {
    let file = path::settings_file(data_dir);
    let content = match tokio::fs::read_to_string(&file).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppSettings::default(),
        Err(e) => {
            log::warn!("读取设置文件失败，使用默认设置: {}", e);
            return AppSettings::default();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::warn!("解析设置文件失败，使用默认设置: {}", e);
        AppSettings::default()
    })
}
