//! socket 事件的类型化表示
//!
//! 服务端推送事件按事件名解析为 [`ServerEvent`]；客户端发出的事件由 [`ClientEvent`]
//! 给出事件名和 JSON 载荷。

use crate::im::conversation::types::ConversationTarget;
use crate::im::message::types::{Attachment, Message, MessageType, Reaction};
use crate::im::poll::types::Poll;
use crate::im::serialization::deserialize_null_default;
use crate::im::types::event;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// 只携带消息 ID 的事件载荷（删除 / 到期）
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRefEvent {
    #[serde(alias = "_id", alias = "id")]
    pub message_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// `message:edited`：既兼容 `{messageId, content}` 也兼容完整消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEditedEvent {
    #[serde(alias = "_id", alias = "id")]
    pub message_id: String,
    pub content: String,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReactedEvent {
    #[serde(alias = "_id", alias = "id")]
    pub message_id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    #[serde(alias = "user")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    #[serde(alias = "user")]
    pub user_id: String,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Notification,
    Mention,
}

/// 通知（`notification:new` / `mention:notification`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    #[serde(skip_deserializing, default = "default_notification_kind")]
    pub kind: NotificationKind,
    #[serde(default, alias = "message", alias = "content")]
    pub text: String,
    #[serde(default, alias = "from")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read: bool,
}

fn default_notification_kind() -> NotificationKind {
    NotificationKind::Notification
}

/// 服务端推送事件
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    MessageNew(Box<Message>),
    MessageEdited(MessageEditedEvent),
    MessageDeleted(MessageRefEvent),
    MessageReacted(MessageReactedEvent),
    MessageExpired(MessageRefEvent),
    PollCreated(Poll),
    PollUpdated(Poll),
    TypingStart(TypingEvent),
    TypingStop(TypingEvent),
    UserOnline(PresenceEvent),
    UserOffline(PresenceEvent),
    Notification(Notification),
    Mention(Notification),
}

impl ServerEvent {
    /// 按事件名解析载荷；未知事件返回 `Ok(None)`
    pub fn parse(name: &str, data: Value) -> Result<Option<Self>> {
        let event = match name {
            event::MESSAGE_NEW => ServerEvent::MessageNew(Box::new(
                serde_json::from_value(data).context("解析 message:new 失败")?,
            )),
            event::MESSAGE_EDITED => ServerEvent::MessageEdited(
                serde_json::from_value(data).context("解析 message:edited 失败")?,
            ),
            event::MESSAGE_DELETED => ServerEvent::MessageDeleted(
                serde_json::from_value(data).context("解析 message:deleted 失败")?,
            ),
            event::MESSAGE_REACTED => ServerEvent::MessageReacted(
                serde_json::from_value(data).context("解析 message:reacted 失败")?,
            ),
            event::MESSAGE_EXPIRED => ServerEvent::MessageExpired(
                serde_json::from_value(data).context("解析 message:expired 失败")?,
            ),
            event::POLL_CREATED => ServerEvent::PollCreated(
                serde_json::from_value(data).context("解析 poll:created 失败")?,
            ),
            event::POLL_UPDATED => ServerEvent::PollUpdated(
                serde_json::from_value(data).context("解析 poll:updated 失败")?,
            ),
            event::TYPING_START => ServerEvent::TypingStart(
                serde_json::from_value(data).context("解析 typing:start 失败")?,
            ),
            event::TYPING_STOP => ServerEvent::TypingStop(
                serde_json::from_value(data).context("解析 typing:stop 失败")?,
            ),
            event::USER_ONLINE => ServerEvent::UserOnline(parse_presence(data)?),
            event::USER_OFFLINE => ServerEvent::UserOffline(parse_presence(data)?),
            event::NOTIFICATION_NEW => ServerEvent::Notification(
                serde_json::from_value(data).context("解析 notification:new 失败")?,
            ),
            event::MENTION_NOTIFICATION => {
                let mut n: Notification = serde_json::from_value(data)
                    .context("解析 mention:notification 失败")?;
                n.kind = NotificationKind::Mention;
                ServerEvent::Mention(n)
            }
            other => {
                debug!("[Event] 忽略未知事件: {}", other);
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MessageNew(_) => event::MESSAGE_NEW,
            ServerEvent::MessageEdited(_) => event::MESSAGE_EDITED,
            ServerEvent::MessageDeleted(_) => event::MESSAGE_DELETED,
            ServerEvent::MessageReacted(_) => event::MESSAGE_REACTED,
            ServerEvent::MessageExpired(_) => event::MESSAGE_EXPIRED,
            ServerEvent::PollCreated(_) => event::POLL_CREATED,
            ServerEvent::PollUpdated(_) => event::POLL_UPDATED,
            ServerEvent::TypingStart(_) => event::TYPING_START,
            ServerEvent::TypingStop(_) => event::TYPING_STOP,
            ServerEvent::UserOnline(_) => event::USER_ONLINE,
            ServerEvent::UserOffline(_) => event::USER_OFFLINE,
            ServerEvent::Notification(_) => event::NOTIFICATION_NEW,
            ServerEvent::Mention(_) => event::MENTION_NOTIFICATION,
        }
    }
}

/// 在线事件有时只推送一个用户 ID 字符串
fn parse_presence(data: Value) -> Result<PresenceEvent> {
    if let Value::String(user_id) = data {
        return Ok(PresenceEvent {
            user_id,
            last_seen: None,
        });
    }
    serde_json::from_value(data).context("解析在线状态事件失败")
}

/// 发送消息的载荷
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub target: ConversationTarget,
    pub client_id: String,
    pub content: String,
    pub kind: MessageType,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<String>,
    pub disappear_after: Option<u64>,
}

impl OutgoingMessage {
    /// 从待确认消息构造
    pub fn from_pending(target: ConversationTarget, msg: &Message) -> Self {
        Self {
            target,
            client_id: msg.client_id.clone().unwrap_or_default(),
            content: msg.content.clone(),
            kind: msg.kind,
            attachments: msg.attachments.clone(),
            reply_to: msg.reply_to.as_ref().map(|r| r.id().to_string()),
            disappear_after: msg.disappear_after,
        }
    }
}

/// 客户端发出的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Join(ConversationTarget),
    SendMessage(OutgoingMessage),
    MarkRead {
        target: ConversationTarget,
        message_ids: Vec<String>,
    },
    TypingStart(ConversationTarget),
    TypingStop(ConversationTarget),
    PollVoted {
        room_id: String,
        poll: Poll,
    },
    PollCreated {
        room_id: String,
        poll: Poll,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Join(target) => target.join_event(),
            ClientEvent::SendMessage(msg) => msg.target.send_event(),
            ClientEvent::MarkRead { .. } => event::MESSAGE_READ,
            ClientEvent::TypingStart(_) => event::TYPING_START,
            ClientEvent::TypingStop(_) => event::TYPING_STOP,
            ClientEvent::PollVoted { .. } => event::POLL_VOTED,
            ClientEvent::PollCreated { .. } => event::POLL_CREATED,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::Join(target)
            | ClientEvent::TypingStart(target)
            | ClientEvent::TypingStop(target) => target_payload(target),
            ClientEvent::SendMessage(msg) => {
                let mut payload = target_payload(&msg.target);
                payload["clientId"] = json!(msg.client_id);
                payload["content"] = json!(msg.content);
                payload["type"] = json!(msg.kind);
                if !msg.attachments.is_empty() {
                    payload["attachments"] = json!(msg.attachments);
                }
                if let Some(reply_to) = &msg.reply_to {
                    payload["replyTo"] = json!(reply_to);
                }
                if let Some(secs) = msg.disappear_after {
                    payload["disappearAfter"] = json!(secs);
                }
                payload
            }
            ClientEvent::MarkRead {
                target,
                message_ids,
            } => {
                let mut payload = target_payload(target);
                payload["messageIds"] = json!(message_ids);
                payload
            }
            ClientEvent::PollVoted { room_id, poll } | ClientEvent::PollCreated { room_id, poll } => {
                json!({ "roomId": room_id, "poll": poll })
            }
        }
    }
}

fn target_payload(target: &ConversationTarget) -> Value {
    let mut payload = json!({});
    payload[target.id_field()] = json!(target.id());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_consumed_event_name() {
        let msg = json!({
            "_id": "m1", "sender": "u1", "content": "hi",
            "createdAt": "2024-05-01T10:00:00Z", "roomId": "r1"
        });
        let poll = json!({ "_id": "p1", "question": "q", "options": [] });
        let cases = vec![
            (event::MESSAGE_NEW, msg),
            (event::MESSAGE_EDITED, json!({ "messageId": "m1", "content": "x" })),
            (event::MESSAGE_DELETED, json!({ "messageId": "m1" })),
            (event::MESSAGE_REACTED, json!({ "messageId": "m1", "reactions": null })),
            (event::MESSAGE_EXPIRED, json!({ "_id": "m1" })),
            (event::POLL_CREATED, poll.clone()),
            (event::POLL_UPDATED, poll),
            (event::TYPING_START, json!({ "userId": "u2", "roomId": "r1" })),
            (event::TYPING_STOP, json!({ "userId": "u2", "roomId": "r1" })),
            (event::USER_ONLINE, json!("u2")),
            (event::USER_OFFLINE, json!({ "userId": "u2" })),
            (event::NOTIFICATION_NEW, json!({ "_id": "n1", "message": "hello" })),
            (event::MENTION_NOTIFICATION, json!({ "message": "@you", "from": "u3" })),
        ];
        for (name, data) in cases {
            let parsed = ServerEvent::parse(name, data)
                .unwrap_or_else(|e| panic!("{} 解析失败: {}", name, e))
                .unwrap();
            assert_eq!(parsed.name(), name);
        }
    }

    #[test]
    fn mention_is_tagged_and_unknown_events_are_skipped() {
        let parsed = ServerEvent::parse(event::MENTION_NOTIFICATION, json!({ "message": "@me" }))
            .unwrap()
            .unwrap();
        match parsed {
            ServerEvent::Mention(n) => {
                assert_eq!(n.kind, NotificationKind::Mention);
                assert_eq!(n.text, "@me");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ServerEvent::parse("moment:new", json!({})).unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(ServerEvent::parse(event::MESSAGE_DELETED, json!({ "foo": 1 })).is_err());
    }

    #[test]
    fn send_payload_carries_client_id_and_target_field() {
        let out = OutgoingMessage {
            target: ConversationTarget::Private("c1".into()),
            client_id: "abc".into(),
            content: "hello".into(),
            kind: MessageType::Text,
            attachments: vec![],
            reply_to: Some("m0".into()),
            disappear_after: Some(30),
        };
        let ev = ClientEvent::SendMessage(out);
        assert_eq!(ev.name(), "message:private");
        let p = ev.payload();
        assert_eq!(p["chatId"], "c1");
        assert_eq!(p["clientId"], "abc");
        assert_eq!(p["type"], "text");
        assert_eq!(p["replyTo"], "m0");
        assert_eq!(p["disappearAfter"], 30);
        assert!(p.get("attachments").is_none());
    }

    #[test]
    fn join_and_typing_payloads_use_room_id() {
        let target = ConversationTarget::Room("r1".into());
        assert_eq!(ClientEvent::Join(target.clone()).name(), "room:join");
        assert_eq!(ClientEvent::TypingStop(target.clone()).name(), "typing:stop");
        assert_eq!(ClientEvent::TypingStart(target).payload(), json!({ "roomId": "r1" }));
    }
}
