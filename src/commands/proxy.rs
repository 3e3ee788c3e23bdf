//! # 代理端点 Tauri Command
//!
//! 前端通过 `invoke("proxy_request", { endpoint, params })` 调用远程服务，
//! 与本地 HTTP 代理服务共用同一套分发逻辑。
//! `get_proxy_info` 返回 HTTP 代理服务的地址和访问令牌。

use serde_json::{Map, Value};
use tauri::State;

use crate::models::settings::ProxyInfo;
use crate::services::app_state::AppState;
use crate::services::proxy::{self, ProxyEndpoint, ProxyResponse};

/// 执行代理请求
///
/// # 参数
/// - `endpoint` - 端点名，如 `"run.retrieve"`
/// - `params` - 请求参数（camelCase 键），可省略
///
/// # 返回值
/// 始终返回 `{ status, body }`，错误以状态码和错误信封表示，
/// 前端无需区分 IPC 失败和远程失败。
#[tauri::command]
pub async fn proxy_request(
    state: State<'_, AppState>,
    endpoint: String,
    params: Option<Map<String, Value>>,
) -> Result<ProxyResponse, String> {
    let Some(endpoint) = ProxyEndpoint::from_name(&endpoint) else {
        return Ok(ProxyResponse::not_found(&endpoint));
    };
    let api = state.session.api();
    let config = state.session.assistant_config();
    Ok(proxy::dispatch(api.as_ref(), &config, endpoint, &params.unwrap_or_default()).await)
}

/// 本地代理服务的监听地址和访问令牌
#[tauri::command]
pub async fn get_proxy_info(state: State<'_, AppState>) -> Result<ProxyInfo, String> {
    Ok(state.proxy_info().await)
}
