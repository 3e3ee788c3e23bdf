//! # 本地代理 HTTP 服务
//!
//! 在本机端口（默认 `127.0.0.1:8787`）上提供 `/api/<group>/<action>` 接口，
//! 供本机脚本调用，分发逻辑与 IPC command 共用 `proxy::dispatch`。
//!
//! ## 访问控制
//! 代理使用用户的 API Key 调用远程服务，任何请求都可能产生费用，因此：
//! - 每次启动生成随机访问令牌，请求必须携带 `x-assistant-chat-token` 头
//!   （令牌通过 `get_proxy_info` command 获取，不写入日志）
//! - `Host` 头必须是回环地址，拒绝 DNS rebinding 的页面
//! - 只有只读端点（`message.list`、`run.retrieve`）接受 GET，其余只接受 POST
//!
//! 自定义请求头会触发浏览器的 CORS 预检，服务不响应预检，
//! 因此普通网页无法跨域调用。
//!
//! ## 参数来源
//! - URL 查询参数
//! - JSON 对象请求体（POST），与查询参数合并，同名时查询参数优先
//!
//! 请求体不是 JSON 对象时返回 400。

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use reqwest::Url;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::models::settings::ProxySettings;
use crate::services::proxy::{self, ProxyEndpoint, ProxyResponse};
use crate::services::session::ChatSession;

/// 请求体大小上限（字节）
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// 访问令牌请求头
pub const TOKEN_HEADER: &str = "x-assistant-chat-token";

/// 生成本次启动使用的访问令牌
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

struct ProxyContext {
    session: ChatSession,
    token: String,
}

/// 绑定端口并在后台持续接受连接
///
/// # 参数
/// - `settings` - 监听地址
/// - `session` - 提供远程客户端和助手配置
/// - `token` - 请求必须携带的访问令牌
///
/// # 返回值
/// 实际监听的地址（端口为 0 时由系统分配）
pub async fn spawn(
    settings: &ProxySettings,
    session: ChatSession,
    token: String,
) -> Result<SocketAddr, String> {
    if token.is_empty() {
        return Err("代理服务需要访问令牌".to_string());
    }
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("绑定代理地址 {} 失败: {}", addr, e))?;
    let local = listener
        .local_addr()
        .map_err(|e| format!("读取代理监听地址失败: {}", e))?;
    if !local.ip().is_loopback() {
        log::warn!("代理服务监听在非回环地址 {}，请确认网络环境可信", local);
    }
    log::info!("代理服务已启动: http://{}", local);

    tokio::spawn(serve(listener, Arc::new(ProxyContext { session, token })));
    Ok(local)
}

async fn serve(listener: TcpListener, context: Arc<ProxyContext>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("代理服务接受连接失败: {}", e);
                continue;
            }
        };

        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let context = Arc::clone(&context);
                async move { Ok::<_, Infallible>(handle(&context, request).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::debug!("代理连接 {} 结束: {}", peer, e);
            }
        });
    }
}

async fn handle(context: &ProxyContext, request: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let host = parts.headers.get(header::HOST).and_then(|h| h.to_str().ok());
    if !host.is_some_and(is_loopback_host) {
        log::warn!("代理服务拒绝非本机 Host: {:?}", host);
        return to_http(ProxyResponse::error(403, "只接受本机请求"));
    }

    let token = parts.headers.get(TOKEN_HEADER).and_then(|h| h.to_str().ok());
    if token != Some(context.token.as_str()) {
        return to_http(ProxyResponse::error(401, "缺少或错误的访问令牌"));
    }

    let Some(endpoint) = ProxyEndpoint::from_path(&path) else {
        return to_http(ProxyResponse::not_found(&path));
    };
    let allowed = parts.method == Method::POST
        || (parts.method == Method::GET && endpoint.is_read_only());
    if !allowed {
        return to_http(ProxyResponse::error(
            405,
            format!("{} 不支持 {} 请求", endpoint.name(), parts.method),
        ));
    }

    let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return to_http(ProxyResponse::error(413, "请求体过大"));
        }
        Err(e) => {
            return to_http(ProxyResponse::error(400, format!("读取请求体失败: {}", e)));
        }
    };

    let params = match merge_params(parts.uri.query(), &body) {
        Ok(params) => params,
        Err(message) => return to_http(ProxyResponse::error(400, message)),
    };

    let api = context.session.api();
    let config = context.session.assistant_config();
    to_http(proxy::dispatch(api.as_ref(), &config, endpoint, &params).await)
}

/// `Host` 头是否指向本机（`localhost`、`127.0.0.0/8`、`[::1]`，可带端口）
fn is_loopback_host(host: &str) -> bool {
    let name = match host.strip_prefix('[') {
        Some(rest) => rest.split(']').next().unwrap_or_default(),
        None => host.rsplit_once(':').map_or(host, |(name, _)| name),
    };
    name.eq_ignore_ascii_case("localhost")
        || name.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// 合并请求体和查询参数（查询参数优先）
fn merge_params(query: Option<&str>, body: &[u8]) -> Result<Map<String, Value>, String> {
    let mut params = if body.iter().all(u8::is_ascii_whitespace) {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("请求体必须是 JSON 对象".to_string()),
            Err(e) => return Err(format!("解析请求体失败: {}", e)),
        }
    };

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        // 借用 Url 的查询解析完成 `%XX` 和 `+` 解码
        let url = Url::parse(&format!("http://localhost/?{}", query))
            .map_err(|e| format!("解析查询参数失败: {}", e))?;
        for (key, value) in url.query_pairs() {
            params.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }
    Ok(params)
}

fn to_http(response: ProxyResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = Bytes::from(response.body.to_string());
    let mut http_response = Response::new(Full::new(body));
    *http_response.status_mut() = status;
    http_response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    http_response
}
