//! 当前打开会话的状态
//!
//! [`ChatSession`] 持有一个会话的消息列表、输入状态、投票和置顶消息，
//! 把 socket 事件按消息 ID 做定点修改。它不做任何 IO，网络交互全部由客户端完成。

use crate::im::conversation::types::ConversationTarget;
use crate::im::events::ServerEvent;
use crate::im::message::store::{MessageStore, Reconciled};
use crate::im::message::types::{Message, DELETED_PLACEHOLDER, EXPIRED_PLACEHOLDER};
use crate::im::poll::board::PollBoard;
use crate::im::poll::types::Poll;
use crate::im::typing::TypingTracker;
use crate::im::types::UserSummary;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::debug;

/// 一次事件处理后哪些视图需要刷新
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Changes {
    pub messages: bool,
    pub typing: bool,
    pub polls: bool,
    pub pinned: bool,
    /// 本次确认的待发送消息临时 ID
    pub confirmed: Option<String>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        !self.messages && !self.typing && !self.polls && !self.pinned
    }

    pub fn merge(&mut self, other: Changes) {
        self.messages |= other.messages;
        self.typing |= other.typing;
        self.polls |= other.polls;
        self.pinned |= other.pinned;
        if other.confirmed.is_some() {
            self.confirmed = other.confirmed;
        }
    }
}

pub struct ChatSession {
    target: ConversationTarget,
    me: UserSummary,
    key: String,
    store: MessageStore,
    typing: TypingTracker,
    polls: PollBoard,
    pinned: Vec<Message>,
}

impl ChatSession {
    pub fn new(target: ConversationTarget, me: UserSummary, typing_ttl: Duration) -> Self {
        Self {
            key: target.to_string(),
            store: MessageStore::new(target.clone(), me.clone()),
            target,
            me,
            typing: TypingTracker::new(typing_ttl),
            polls: PollBoard::new(),
            pinned: Vec::new(),
        }
    }

    pub fn target(&self) -> &ConversationTarget {
        &self.target
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    pub fn messages(&self) -> Vec<Message> {
        self.store.messages().to_vec()
    }

    pub fn typing_users(&self, now: Instant) -> Vec<String> {
        self.typing.active(&self.key, now)
    }

    pub fn polls(&self) -> &[Poll] {
        self.polls.polls()
    }

    pub fn upsert_poll(&mut self, poll: Poll) {
        self.polls.upsert(poll);
    }

    pub fn pinned(&self) -> &[Message] {
        &self.pinned
    }

    pub fn set_pinned(&mut self, pinned: Vec<Message>) {
        self.pinned = pinned;
    }

    /// 置顶 / 取消置顶后本地同步；返回置顶列表是否变化
    pub fn toggle_pinned(&mut self, message_id: &str, pinned: bool) -> bool {
        let present = self.pinned.iter().any(|m| m.id == message_id);
        match (pinned, present) {
            (true, false) => match self.store.get(message_id) {
                Some(msg) => {
                    self.pinned.push(msg.clone());
                    true
                }
                None => false,
            },
            (false, true) => {
                self.pinned.retain(|m| m.id != message_id);
                true
            }
            _ => false,
        }
    }

    /// 没有携带会话 ID 的事件按消息 ID 在本会话中查找
    fn in_scope(&self, room_id: Option<&str>, chat_id: Option<&str>) -> bool {
        (room_id.is_none() && chat_id.is_none()) || self.target.matches(room_id, chat_id)
    }

    fn poll_in_scope(&self, poll: &Poll) -> bool {
        match (&self.target, poll.room_id.as_deref()) {
            (ConversationTarget::Room(id), Some(room)) => id == room,
            (ConversationTarget::Room(_), None) => true,
            (ConversationTarget::Private(_), _) => false,
        }
    }

    /// 处理一条服务端事件
    pub fn apply(&mut self, event: &ServerEvent, now: Instant) -> Changes {
        let mut changes = Changes::default();
        match event {
            ServerEvent::MessageNew(msg) => {
                if !self.target.owns(msg) {
                    return changes;
                }
                // 对方的消息到达即视为停止输入
                changes.typing = self.typing.stop(&self.key, msg.sender_id());
                if let Reconciled::ConfirmedPending { temp_id } = self.store.receive((**msg).clone())
                {
                    changes.confirmed = Some(temp_id);
                }
                changes.messages = true;
            }
            ServerEvent::MessageEdited(e) => {
                if !self.in_scope(e.room_id.as_deref(), e.chat_id.as_deref()) {
                    return changes;
                }
                changes.messages = self.store.apply_edit(&e.message_id, &e.content, e.edited_at);
                if let Some(p) = self.pinned.iter_mut().find(|m| m.id == e.message_id) {
                    if !p.is_deleted {
                        p.content = e.content.clone();
                        p.edited_at = e.edited_at.or(p.edited_at);
                        changes.pinned = true;
                    }
                }
            }
            ServerEvent::MessageDeleted(e) | ServerEvent::MessageExpired(e) => {
                if !self.in_scope(e.room_id.as_deref(), e.chat_id.as_deref()) {
                    return changes;
                }
                let (changed, placeholder) = match event {
                    ServerEvent::MessageDeleted(_) => {
                        (self.store.apply_delete(&e.message_id), DELETED_PLACEHOLDER)
                    }
                    _ => (self.store.apply_expired(&e.message_id), EXPIRED_PLACEHOLDER),
                };
                debug!("[Session] 🪦 {} -> {}", e.message_id, placeholder);
                changes.messages = changed;
                let before = self.pinned.len();
                self.pinned.retain(|m| m.id != e.message_id);
                changes.pinned = self.pinned.len() != before;
            }
            ServerEvent::MessageReacted(e) => {
                if !self.in_scope(e.room_id.as_deref(), e.chat_id.as_deref()) {
                    return changes;
                }
                changes.messages = self
                    .store
                    .apply_reactions(&e.message_id, e.reactions.clone());
            }
            ServerEvent::PollCreated(poll) | ServerEvent::PollUpdated(poll) => {
                if self.poll_in_scope(poll) {
                    self.polls.upsert(poll.clone());
                    changes.polls = true;
                }
            }
            ServerEvent::TypingStart(e) => {
                if e.user_id != self.me.id && self.in_scope(e.room_id.as_deref(), e.chat_id.as_deref())
                {
                    changes.typing = self.typing.start(&self.key, &e.user_id, now);
                }
            }
            ServerEvent::TypingStop(e) => {
                if e.user_id != self.me.id && self.in_scope(e.room_id.as_deref(), e.chat_id.as_deref())
                {
                    changes.typing = self.typing.stop(&self.key, &e.user_id);
                }
            }
            // 在线状态和通知不属于单个会话
            ServerEvent::UserOnline(_)
            | ServerEvent::UserOffline(_)
            | ServerEvent::Notification(_)
            | ServerEvent::Mention(_) => {}
        }
        changes
    }

    /// 定时维护：过期输入状态和阅后即焚消息
    pub fn prune(&mut self, now: Instant, wall_clock: DateTime<Utc>) -> Changes {
        let mut changes = Changes::default();
        changes.typing = !self.typing.prune(now).is_empty();
        let expired = self.store.sweep_expired(wall_clock);
        if !expired.is_empty() {
            debug!("[Session] ⏰ 本地过期 {} 条消息", expired.len());
            changes.messages = true;
            let before = self.pinned.len();
            self.pinned.retain(|m| !expired.contains(&m.id));
            changes.pinned = self.pinned.len() != before;
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::im::events::{MessageEditedEvent, MessageRefEvent, TypingEvent};
    use crate::im::message::types::MessageDraft;
    use chrono::TimeZone;
    use serde_json::json;

    fn me() -> UserSummary {
        UserSummary {
            id: "me".into(),
            username: "me".into(),
            avatar: None,
        }
    }

    fn session() -> ChatSession {
        ChatSession::new(
            ConversationTarget::Room("r1".into()),
            me(),
            Duration::from_secs(5),
        )
    }

    fn incoming(id: &str, sender: &str, content: &str, room: &str) -> ServerEvent {
        let msg: Message = serde_json::from_value(json!({
            "_id": id, "sender": sender, "content": content,
            "createdAt": "2024-05-01T10:00:00Z", "roomId": room
        }))
        .unwrap();
        ServerEvent::MessageNew(Box::new(msg))
    }

    fn typing(user: &str, room: &str) -> TypingEvent {
        TypingEvent {
            user_id: user.into(),
            username: None,
            room_id: Some(room.into()),
            chat_id: None,
        }
    }

    #[test]
    fn messages_for_other_conversations_are_ignored() {
        let mut s = session();
        let changes = s.apply(&incoming("m1", "u2", "hi", "r2"), Instant::now());
        assert!(changes.is_empty());
        assert!(s.store().is_empty());
    }

    #[test]
    fn hello_round_trip_confirms_pending() {
        let mut s = session();
        let pending = s.store_mut().append_pending(&MessageDraft::text("hello"));
        let changes = s.apply(&incoming("m1", "me", "hello", "r1"), Instant::now());
        assert_eq!(changes.confirmed, Some(pending.id));
        assert_eq!(s.store().len(), 1);
        assert!(!s.store().messages()[0].is_pending());
    }

    #[test]
    fn duplicate_typing_start_yields_single_entry_and_own_typing_is_ignored() {
        let mut s = session();
        let now = Instant::now();
        assert!(s.apply(&ServerEvent::TypingStart(typing("u2", "r1")), now).typing);
        assert!(!s.apply(&ServerEvent::TypingStart(typing("u2", "r1")), now).typing);
        assert!(!s.apply(&ServerEvent::TypingStart(typing("me", "r1")), now).typing);
        assert_eq!(s.typing_users(now), vec!["u2".to_string()]);
    }

    #[test]
    fn message_from_typing_user_clears_typing() {
        let mut s = session();
        let now = Instant::now();
        s.apply(&ServerEvent::TypingStart(typing("u2", "r1")), now);
        let changes = s.apply(&incoming("m1", "u2", "done", "r1"), now);
        assert!(changes.typing);
        assert!(s.typing_users(now).is_empty());
    }

    #[test]
    fn typing_expires_on_prune() {
        let mut s = session();
        let now = Instant::now();
        s.apply(&ServerEvent::TypingStart(typing("u2", "r1")), now);
        let later = now + Duration::from_secs(6);
        let changes = s.prune(later, Utc::now());
        assert!(changes.typing);
        assert!(s.typing_users(later).is_empty());
    }

    #[test]
    fn delete_removes_pinned_and_tombstones() {
        let mut s = session();
        let now = Instant::now();
        s.apply(&incoming("m1", "u2", "secret", "r1"), now);
        assert!(s.toggle_pinned("m1", true));
        let changes = s.apply(
            &ServerEvent::MessageDeleted(MessageRefEvent {
                message_id: "m1".into(),
                room_id: None,
                chat_id: None,
            }),
            now,
        );
        assert!(changes.messages && changes.pinned);
        assert!(s.pinned().is_empty());
        let m = s.store().get("m1").unwrap();
        assert_eq!(m.content, DELETED_PLACEHOLDER);
        assert!(m.is_deleted);
    }

    #[test]
    fn late_new_message_after_delete_and_edit_keeps_local_state() {
        let mut s = session();
        let now = Instant::now();
        s.apply(&incoming("m1", "u2", "secret", "r1"), now);
        s.apply(&incoming("m2", "u2", "v1", "r1"), now);
        s.apply(
            &ServerEvent::MessageDeleted(MessageRefEvent {
                message_id: "m1".into(),
                room_id: Some("r1".into()),
                chat_id: None,
            }),
            now,
        );
        s.apply(
            &ServerEvent::MessageEdited(MessageEditedEvent {
                message_id: "m2".into(),
                content: "v2".into(),
                edited_at: None,
                room_id: Some("r1".into()),
                chat_id: None,
            }),
            now,
        );

        s.apply(&incoming("m1", "u2", "secret", "r1"), now);
        s.apply(&incoming("m2", "u2", "v1", "r1"), now);

        assert_eq!(s.store().len(), 2);
        let deleted = s.store().get("m1").unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, DELETED_PLACEHOLDER);
        assert_eq!(s.store().get("m2").unwrap().content, "v2");
    }

    #[test]
    fn edit_scoped_to_other_room_is_ignored() {
        let mut s = session();
        let now = Instant::now();
        s.apply(&incoming("m1", "u2", "v1", "r1"), now);
        let edit = |room: &str| {
            ServerEvent::MessageEdited(MessageEditedEvent {
                message_id: "m1".into(),
                content: "v2".into(),
                edited_at: None,
                room_id: Some(room.into()),
                chat_id: None,
            })
        };
        assert!(!s.apply(&edit("r2"), now).messages);
        assert!(s.apply(&edit("r1"), now).messages);
        assert_eq!(s.store().get("m1").unwrap().content, "v2");
    }

    #[test]
    fn polls_only_apply_to_matching_room() {
        let mut s = session();
        let poll = |room: &str| -> Poll {
            serde_json::from_value(json!({
                "_id": "p1", "roomId": room, "question": "q",
                "options": [{ "text": "a", "votes": [] }]
            }))
            .unwrap()
        };
        assert!(!s.apply(&ServerEvent::PollCreated(poll("r2")), Instant::now()).polls);
        assert!(s.apply(&ServerEvent::PollCreated(poll("r1")), Instant::now()).polls);
        assert!(s.apply(&ServerEvent::PollUpdated(poll("r1")), Instant::now()).polls);
        assert_eq!(s.polls().len(), 1);
    }

    #[test]
    fn disappearing_message_expires_on_prune() {
        let mut s = session();
        let msg: Message = serde_json::from_value(json!({
            "_id": "m1", "sender": "u2", "content": "poof",
            "createdAt": "2024-05-01T10:00:00Z", "roomId": "r1", "disappearAfter": 10
        }))
        .unwrap();
        s.apply(&ServerEvent::MessageNew(Box::new(msg)), Instant::now());
        let wall = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 11).unwrap();
        assert!(s.prune(Instant::now(), wall).messages);
        assert_eq!(s.store().get("m1").unwrap().content, EXPIRED_PLACEHOLDER);
    }

    #[test]
    fn prune_survives_out_of_range_disappear_after() {
        let mut s = session();
        let msg: Message = serde_json::from_value(json!({
            "_id": "m1", "sender": "u2", "content": "forever",
            "createdAt": "2024-05-01T10:00:00Z", "roomId": "r1",
            "disappearAfter": 10_000_000_000_000_000u64
        }))
        .unwrap();
        s.apply(&ServerEvent::MessageNew(Box::new(msg)), Instant::now());
        let wall = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        assert!(!s.prune(Instant::now(), wall).messages);
        assert_eq!(s.store().get("m1").unwrap().content, "forever");
    }
}
