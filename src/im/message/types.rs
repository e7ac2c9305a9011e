//! 消息类型定义
//!
//! 与服务端 REST / socket 推送的 JSON 结构对应（camelCase 字段，`_id` 主键）。

use crate::im::serialization::deserialize_null_default;
use crate::im::types::UserSummary;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// 删除后的占位文本（墓碑）
pub const DELETED_PLACEHOLDER: &str = "This message was deleted";

/// 阅后即焚到期后的占位文本（墓碑）
pub const EXPIRED_PLACEHOLDER: &str = "This message has expired";

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Audio,
    File,
    /// 未知类型按文本展示
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// 根据附件 MIME 推断消息类型
    pub fn from_attachments(attachments: &[Attachment]) -> Self {
        match attachments.first() {
            None => MessageType::Text,
            Some(a) if a.mimetype.starts_with("image/") => MessageType::Image,
            Some(a) if a.mimetype.starts_with("audio/") => MessageType::Audio,
            Some(_) => MessageType::File,
        }
    }
}

/// 本地投递状态（不参与序列化）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryState {
    /// 乐观插入，等待服务端确认
    Pending,
    /// 服务端权威副本
    #[default]
    Sent,
    /// 发送失败，保留在列表中等待重试或丢弃
    Failed,
}

/// 发送者引用：服务端有时只返回用户 ID，有时内嵌用户信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SenderRef {
    Id(String),
    User(UserSummary),
}

impl SenderRef {
    pub fn id(&self) -> &str {
        match self {
            SenderRef::Id(id) => id,
            SenderRef::User(user) => &user.id,
        }
    }
}

/// 附件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub size: u64,
}

/// 回复预览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: Option<SenderRef>,
}

/// 回复引用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyRef {
    Id(String),
    Preview(ReplyPreview),
}

impl ReplyRef {
    pub fn id(&self) -> &str {
        match self {
            ReplyRef::Id(id) => id,
            ReplyRef::Preview(p) => &p.id,
        }
    }
}

/// 表情回应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    #[serde(default)]
    pub users: Vec<String>,
}

/// 消息记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// 客户端生成的幂等 ID，服务端回显时用于精确对账
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub sender: SenderRef,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyRef>,
    /// 阅后即焚时长（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disappear_after: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub delivered_to: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub read_by: Vec<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub reactions: Vec<Reaction>,
    #[serde(default, alias = "room", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, alias = "chat", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip)]
    pub delivery: DeliveryState,
}

impl Message {
    pub fn sender_id(&self) -> &str {
        self.sender.id()
    }

    pub fn is_pending(&self) -> bool {
        self.delivery == DeliveryState::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.delivery == DeliveryState::Failed
    }

    /// 阅后即焚到期时间；超出时间范围的时长视为永不过期
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.disappear_after?).ok()?;
        let after = TimeDelta::try_seconds(secs)?;
        self.created_at.checked_add_signed(after)
    }

    /// 转为墓碑：替换内容、清空附件并置删除标记
    pub(crate) fn tombstone(&mut self, placeholder: &str) {
        self.content = placeholder.to_string();
        self.attachments.clear();
        self.is_deleted = true;
    }

    /// 会话列表中展示的摘要
    pub fn preview(&self) -> String {
        if self.is_deleted {
            return self.content.clone();
        }
        if !self.content.is_empty() {
            return self.content.clone();
        }
        match self.kind {
            MessageType::Image => "[图片]".to_string(),
            MessageType::Audio => "[语音]".to_string(),
            MessageType::File => "[文件]".to_string(),
            MessageType::Text | MessageType::Unknown => String::new(),
        }
    }
}

/// 待发送消息草稿
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
    pub disappear_after: Option<u64>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// 去除首尾空白后既无文本也无附件，视为空消息
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_message_with_embedded_sender() {
        let json = serde_json::json!({
            "_id": "m1",
            "sender": { "_id": "u1", "username": "alice" },
            "content": "hi",
            "type": "text",
            "createdAt": "2024-05-01T10:00:00Z",
            "roomId": "r1",
            "reactions": [{ "emoji": "👍", "users": ["u2"] }]
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.sender_id(), "u1");
        assert_eq!(msg.room_id.as_deref(), Some("r1"));
        assert_eq!(msg.delivery, DeliveryState::Sent);
        assert_eq!(msg.reactions[0].users, vec!["u2".to_string()]);
    }

    #[test]
    fn unknown_type_and_bare_sender_are_accepted() {
        let json = serde_json::json!({
            "id": "m2",
            "sender": "u9",
            "type": "sticker",
            "createdAt": "2024-05-01T10:00:00.123Z",
            "replyTo": "m1"
        });
        let msg: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg.kind, MessageType::Unknown);
        assert_eq!(msg.sender_id(), "u9");
        assert_eq!(msg.reply_to.as_ref().map(|r| r.id()), Some("m1"));
    }

    #[test]
    fn message_type_follows_first_attachment() {
        let image = Attachment {
            url: "https://cdn/x.png".into(),
            filename: "x.png".into(),
            mimetype: "image/png".into(),
            size: 10,
        };
        assert_eq!(MessageType::from_attachments(&[]), MessageType::Text);
        assert_eq!(MessageType::from_attachments(&[image]), MessageType::Image);
    }

    #[test]
    fn whitespace_only_draft_is_empty() {
        assert!(MessageDraft::text("   ").is_empty());
        assert!(!MessageDraft::text(" hi ").is_empty());
    }
}
