//! 会话相关结构体

use crate::im::message::types::Message;
use crate::im::serialization::deserialize_null_default;
use crate::im::types::{event, UserSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 当前打开的会话：群聊房间或私聊
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ConversationTarget {
    Room(String),
    Private(String),
}

impl ConversationTarget {
    pub fn id(&self) -> &str {
        match self {
            ConversationTarget::Room(id) | ConversationTarget::Private(id) => id,
        }
    }

    pub fn kind(&self) -> ConversationKind {
        match self {
            ConversationTarget::Room(_) => ConversationKind::Room,
            ConversationTarget::Private(_) => ConversationKind::Private,
        }
    }

    /// 加入会话时发出的 socket 事件名
    pub fn join_event(&self) -> &'static str {
        match self {
            ConversationTarget::Room(_) => event::ROOM_JOIN,
            ConversationTarget::Private(_) => event::CHAT_JOIN,
        }
    }

    /// 发送消息时使用的 socket 事件名
    pub fn send_event(&self) -> &'static str {
        match self {
            ConversationTarget::Room(_) => event::MESSAGE_ROOM,
            ConversationTarget::Private(_) => event::MESSAGE_PRIVATE,
        }
    }

    /// 在 JSON 载荷中标识会话的字段名
    pub fn id_field(&self) -> &'static str {
        match self {
            ConversationTarget::Room(_) => "roomId",
            ConversationTarget::Private(_) => "chatId",
        }
    }

    /// 消息是否属于该会话
    pub fn owns(&self, msg: &Message) -> bool {
        self.matches(msg.room_id.as_deref(), msg.chat_id.as_deref())
    }

    /// 根据事件携带的 roomId / chatId 判断是否属于该会话
    pub fn matches(&self, room_id: Option<&str>, chat_id: Option<&str>) -> bool {
        match self {
            ConversationTarget::Room(id) => room_id == Some(id.as_str()),
            ConversationTarget::Private(id) => chat_id == Some(id.as_str()),
        }
    }

    /// 从 roomId / chatId 推断会话，roomId 优先
    pub fn from_ids(room_id: Option<&str>, chat_id: Option<&str>) -> Option<Self> {
        match (room_id, chat_id) {
            (Some(r), _) => Some(ConversationTarget::Room(r.to_string())),
            (None, Some(c)) => Some(ConversationTarget::Private(c.to_string())),
            (None, None) => None,
        }
    }

    pub fn of_message(msg: &Message) -> Option<Self> {
        Self::from_ids(msg.room_id.as_deref(), msg.chat_id.as_deref())
    }
}

impl fmt::Display for ConversationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationTarget::Room(id) => write!(f, "room:{}", id),
            ConversationTarget::Private(id) => write!(f, "chat:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Room,
    Private,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Room => "room",
            ConversationKind::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "room" => Some(ConversationKind::Room),
            "private" => Some(ConversationKind::Private),
            _ => None,
        }
    }
}

/// 会话列表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub kind: ConversationKind,
    pub name: String,
    pub members: Vec<String>,
    pub last_message: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub unread_count: u32,
}

impl ConversationSummary {
    pub fn target(&self) -> ConversationTarget {
        match self.kind {
            ConversationKind::Room => ConversationTarget::Room(self.id.clone()),
            ConversationKind::Private => ConversationTarget::Private(self.id.clone()),
        }
    }
}

/// 成员引用：ID 或内嵌用户
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MemberRef {
    Id(String),
    User(UserSummary),
}

impl MemberRef {
    fn id(&self) -> &str {
        match self {
            MemberRef::Id(id) => id,
            MemberRef::User(u) => &u.id,
        }
    }

    fn display_name(&self) -> &str {
        match self {
            MemberRef::Id(id) => id,
            MemberRef::User(u) if !u.username.is_empty() => &u.username,
            MemberRef::User(u) => &u.id,
        }
    }
}

/// `/api/rooms` 返回的房间
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub members: Vec<MemberRef>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default, alias = "updatedAt")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

/// `/api/chats` 返回的私聊
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateChatDto {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub participants: Vec<MemberRef>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default, alias = "updatedAt")]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
}

/// 最近一条消息：可能是完整消息，也可能只是文本
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LastMessage {
    Text(String),
    Message(Box<Message>),
}

impl LastMessage {
    fn preview(&self) -> String {
        match self {
            LastMessage::Text(s) => s.clone(),
            LastMessage::Message(m) => m.preview(),
        }
    }
}

impl RoomDto {
    pub fn into_summary(self) -> ConversationSummary {
        let last_activity = self
            .last_activity
            .or(self.created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        ConversationSummary {
            members: self.members.iter().map(|m| m.id().to_string()).collect(),
            last_message: self.last_message.as_ref().map(LastMessage::preview),
            id: self.id,
            kind: ConversationKind::Room,
            name: self.name,
            last_activity,
            unread_count: self.unread_count,
        }
    }
}

impl PrivateChatDto {
    /// 私聊名称取对方用户名
    pub fn into_summary(self, self_id: &str) -> ConversationSummary {
        let last_activity = self
            .last_activity
            .or(self.created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let name = self
            .participants
            .iter()
            .find(|p| p.id() != self_id)
            .map(|p| p.display_name().to_string())
            .unwrap_or_default();
        ConversationSummary {
            members: self.participants.iter().map(|m| m.id().to_string()).collect(),
            last_message: self.last_message.as_ref().map(LastMessage::preview),
            id: self.id,
            kind: ConversationKind::Private,
            name,
            last_activity,
            unread_count: self.unread_count,
        }
    }
}
