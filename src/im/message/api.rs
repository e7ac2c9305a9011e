//! 消息 HTTP API 客户端
//!
//! 历史拉取、编辑、删除、回应、置顶、搜索和附件上传

use crate::im::conversation::types::ConversationTarget;
use crate::im::message::types::{Attachment, Message, Reaction};
use crate::im::types::handle_http_response;
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// `react` 接口返回：完整消息或仅回应列表
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReactResp {
    Message(Box<Message>),
    Reactions { reactions: Vec<Reaction> },
}

/// 搜索接口可能直接返回数组，也可能包一层 `messages`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageListResp {
    List(Vec<Message>),
    Wrapped { messages: Vec<Message> },
}

impl MessageListResp {
    fn into_vec(self) -> Vec<Message> {
        match self {
            MessageListResp::List(v) => v,
            MessageListResp::Wrapped { messages } => messages,
        }
    }
}

pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl MessageApi {
    /// `client` 应该已经配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn conversation_path(target: &ConversationTarget) -> String {
        match target {
            ConversationTarget::Room(id) => format!("room/{}", id),
            ConversationTarget::Private(id) => format!("chat/{}", id),
        }
    }

    fn history_url(
        &self,
        target: &ConversationTarget,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> String {
        let mut url = format!(
            "{}/api/messages/{}?limit={}",
            self.api_base_url,
            Self::conversation_path(target),
            limit
        );
        if let Some(before) = before {
            url.push_str("&before=");
            url.push_str(&before.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        url
    }

    /// 拉取历史消息（按创建时间升序返回给调用方）
    pub async fn fetch_history(
        &self,
        target: &ConversationTarget,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let url = self.history_url(target, limit, before);
        info!("[MsgAPI] 📡 拉取历史消息: {}", target);
        debug!("[MsgAPI]   请求URL: {}", url);
        let response = self.client.get(&url).send().await.context("请求失败")?;
        let mut messages = handle_http_response::<MessageListResp>(response, "拉取历史消息")
            .await?
            .into_vec();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> Result<Message> {
        let url = format!("{}/api/messages/{}", self.api_base_url, message_id);
        info!("[MsgAPI] ✏️ 编辑消息: {}", message_id);
        let response = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .context("请求失败")?;
        handle_http_response(response, "编辑消息").await
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let url = format!("{}/api/messages/{}", self.api_base_url, message_id);
        info!("[MsgAPI] 🗑️ 删除消息: {}", message_id);
        let response = self.client.delete(&url).send().await.context("请求失败")?;
        handle_http_response::<serde_json::Value>(response, "删除消息").await?;
        Ok(())
    }

    pub async fn react(&self, message_id: &str, emoji: &str) -> Result<Vec<Reaction>> {
        let url = format!("{}/api/messages/{}/react", self.api_base_url, message_id);
        debug!("[MsgAPI] 回应消息: {} {}", message_id, emoji);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "emoji": emoji }))
            .send()
            .await
            .context("请求失败")?;
        let resp: ReactResp = handle_http_response(response, "回应消息").await?;
        Ok(match resp {
            ReactResp::Message(m) => m.reactions,
            ReactResp::Reactions { reactions } => reactions,
        })
    }

    /// 置顶 / 取消置顶
    pub async fn set_pinned(&self, message_id: &str, pinned: bool) -> Result<()> {
        let url = format!("{}/api/messages/{}/pin", self.api_base_url, message_id);
        info!("[MsgAPI] 📌 置顶状态变更: {} -> {}", message_id, pinned);
        let request = if pinned {
            self.client.post(&url)
        } else {
            self.client.delete(&url)
        };
        let response = request.send().await.context("请求失败")?;
        handle_http_response::<serde_json::Value>(response, "置顶消息").await?;
        Ok(())
    }

    pub async fn fetch_pinned(&self, target: &ConversationTarget) -> Result<Vec<Message>> {
        let url = format!(
            "{}/api/messages/{}/pinned",
            self.api_base_url,
            Self::conversation_path(target)
        );
        let response = self.client.get(&url).send().await.context("请求失败")?;
        Ok(handle_http_response::<MessageListResp>(response, "拉取置顶消息")
            .await?
            .into_vec())
    }

    pub async fn search(
        &self,
        target: Option<&ConversationTarget>,
        query: &str,
    ) -> Result<Vec<Message>> {
        let url = format!("{}/api/messages/search", self.api_base_url);
        let mut params: Vec<(&str, &str)> = vec![("q", query)];
        if let Some(t) = target {
            params.push((t.id_field(), t.id()));
        }
        debug!("[MsgAPI] 🔍 搜索消息: {:?}", params);
        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("请求失败")?;
        Ok(handle_http_response::<MessageListResp>(response, "搜索消息")
            .await?
            .into_vec())
    }

    /// 上传本地文件，返回可直接放进消息的附件
    pub async fn upload(&self, path: &Path) -> Result<Attachment> {
        let url = format!("{}/api/upload", self.api_base_url);
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let mimetype = guess_mime(path);
        let size = bytes.len() as u64;

        info!("[MsgAPI] ⬆️ 上传文件: {} ({} bytes)", filename, size);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.clone())
            .mime_str(mimetype)
            .context("无效的 MIME 类型")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .context("请求失败")?;

        #[derive(Deserialize)]
        struct UploadResp {
            url: String,
            #[serde(default)]
            filename: Option<String>,
            #[serde(default)]
            mimetype: Option<String>,
            #[serde(default)]
            size: Option<u64>,
        }
        let resp: UploadResp = handle_http_response(response, "上传文件").await?;
        Ok(Attachment {
            url: resp.url,
            filename: resp.filename.unwrap_or(filename),
            mimetype: resp.mimetype.unwrap_or_else(|| mimetype.to_string()),
            size: resp.size.unwrap_or(size),
        })
    }
}

/// 按扩展名推断 MIME 类型
pub fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn api() -> MessageApi {
        MessageApi::new(reqwest::Client::new(), "http://localhost:5000/".into())
    }

    #[test]
    fn history_url_encodes_target_and_cursor() {
        let api = api();
        assert_eq!(
            api.history_url(&ConversationTarget::Room("r1".into()), 50, None),
            "http://localhost:5000/api/messages/room/r1?limit=50"
        );
        let before = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(
            api.history_url(&ConversationTarget::Private("c1".into()), 20, Some(before)),
            "http://localhost:5000/api/messages/chat/c1?limit=20&before=2023-11-14T22:13:20.000Z"
        );
    }

    #[test]
    fn mime_guess_by_extension() {
        assert_eq!(guess_mime(Path::new("a/photo.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("voice.webm")), "audio/webm");
        assert_eq!(guess_mime(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn list_response_accepts_both_shapes() {
        let msg = serde_json::json!({
            "_id": "m1", "sender": "u1", "createdAt": "2024-05-01T10:00:00Z"
        });
        let plain: MessageListResp = serde_json::from_value(serde_json::json!([msg.clone()])).unwrap();
        assert_eq!(plain.into_vec().len(), 1);
        let wrapped: MessageListResp =
            serde_json::from_value(serde_json::json!({ "messages": [msg] })).unwrap();
        assert_eq!(wrapped.into_vec()[0].id, "m1");
    }
}
