use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// socket 事件名
pub mod event {
    // 服务端推送
    pub const MESSAGE_NEW: &str = "message:new";
    pub const MESSAGE_EDITED: &str = "message:edited";
    pub const MESSAGE_DELETED: &str = "message:deleted";
    pub const MESSAGE_REACTED: &str = "message:reacted";
    pub const MESSAGE_EXPIRED: &str = "message:expired";
    pub const POLL_CREATED: &str = "poll:created";
    pub const POLL_UPDATED: &str = "poll:updated";
    pub const TYPING_START: &str = "typing:start";
    pub const TYPING_STOP: &str = "typing:stop";
    pub const USER_ONLINE: &str = "user:online";
    pub const USER_OFFLINE: &str = "user:offline";
    pub const NOTIFICATION_NEW: &str = "notification:new";
    pub const MENTION_NOTIFICATION: &str = "mention:notification";

    // 客户端发出
    pub const ROOM_JOIN: &str = "room:join";
    pub const CHAT_JOIN: &str = "chat:join";
    pub const MESSAGE_ROOM: &str = "message:room";
    pub const MESSAGE_PRIVATE: &str = "message:private";
    pub const MESSAGE_READ: &str = "message:read";
    pub const POLL_VOTED: &str = "poll:voted";
}

/// 用户摘要（消息发送者、成员列表等场景内嵌）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// 服务端错误响应体：`{ "message": "..." }` 或 `{ "error": "..." }`
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// 创建带认证头的 HTTP 客户端（token 通过 default_headers 自动添加）
pub fn build_http_client(token: &str) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .context("无效的 token")?,
    );
    reqwest::ClientBuilder::new()
        .default_headers(headers)
        .build()
        .context("创建 HTTP 客户端失败")
}

/// 通用 HTTP 响应处理：非 2xx 转为错误，成功时反序列化为 `T`
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;

    let status = response.status();
    // body 只能读取一次
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    parse_api_body(status, &body_bytes, operation_name)
}

/// 从状态码和原始 body 解析响应（与网络读取分离，便于测试）
pub fn parse_api_body<T: serde::de::DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &[u8],
    operation_name: &str,
) -> anyhow::Result<T> {
    let body_str = String::from_utf8_lossy(body);

    if !status.is_success() {
        let detail = serde_json::from_slice::<ApiErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| body_str.to_string());
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, detail));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    serde_json::from_slice::<T>(body).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })
}
